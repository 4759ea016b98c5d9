//! Feature schemas and their derivation into encoder-ready form.

mod cache;
mod codelist;
mod transform;
mod types;

pub use cache::{SchemaCache, SchemaCacheKey, SchemaDeriver};
pub use codelist::Codelist;
pub use transform::{
    transform, FlattenedSchemaDeriver, PropertyTransformation, PropertyTransformations,
    SchemaTransformer, DEFAULT_MAX_MULTIPLICITY,
};
pub use types::{
    Constraints, FeatureSchema, GeometryType, Role, SchemaType, SchemaVisitor,
};
