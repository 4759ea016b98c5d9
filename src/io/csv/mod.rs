//! Write feature streams as CSV.

pub use writer::{CsvEncoder, CsvOptions};

mod writer;
