//! Schema-driven streaming encoders for geospatial feature collections.
//!
//! A [`FeatureSchema`](schema::FeatureSchema) describes the properties of a feature type. The
//! [`schema`] module flattens nested properties into the column layout required by tabular and
//! binary formats and caches the result per collection. The encoders in [`io`] consume a lazy
//! stream of features through the shared [`FeatureEncoder`](encoder::FeatureEncoder) contract
//! and write FlatGeobuf, CSV or GML to any [`std::io::Write`] sink.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod crs;
pub mod encoder;
pub mod error;
pub mod geometry;
pub mod io;
pub mod schema;
#[cfg(test)]
pub(crate) mod test;
