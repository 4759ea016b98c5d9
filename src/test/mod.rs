pub(crate) mod crs;
#[cfg(feature = "flatgeobuf")]
pub(crate) mod fgb;
