//! Write [FlatGeobuf](https://flatgeobuf.org/) feature streams.

mod geometry;
mod header;
mod properties;
mod writer;

pub use writer::{FlatgeobufEncoder, FlatgeobufOptions};

/// Leading bytes of a FlatGeobuf stream, format version 3.
pub(crate) const MAGIC_BYTES: [u8; 8] = *b"fgb\x03fgb\0";
