//! Encoders of feature streams into the supported output formats.

pub mod csv;
#[cfg(feature = "flatgeobuf")]
pub mod flatgeobuf;
pub mod gml;
