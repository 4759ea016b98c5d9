//! Streaming GML output.
//!
//! Features arrive either as [`MarkupElement`] trees through
//! [`FeatureEncoder`](crate::encoder::FeatureEncoder) or as individual element events on
//! [`GmlEncoder`].

pub use coordinates::CoordinatesFormat;
pub use feature::{MarkupElement, MarkupNode};
pub use names::{
    Attribute, Namespaces, QName, ATOM_NAMESPACE, GML_NAMESPACE, WFS_NAMESPACE, XLINK_NAMESPACE,
    XSI_NAMESPACE,
};
pub use writer::{GmlEncoder, GmlOptions, Link};

mod coordinates;
mod feature;
mod names;
mod writer;
