use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;

use crate::crs::{CrsTransformer, EpsgCrs};
use crate::schema::{FeatureSchema, DEFAULT_MAX_MULTIPLICITY};

/// Information about the whole stream, delivered at start and end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetadata {
    /// Number of features matching the request, if known.
    pub number_matched: Option<u64>,

    /// Number of features in this stream, if known.
    pub number_returned: Option<u64>,

    pub timestamp: Option<DateTime<Utc>>,
}

impl StreamMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number_matched(mut self, number_matched: u64) -> Self {
        self.number_matched = Some(number_matched);
        self
    }

    pub fn with_number_returned(mut self, number_returned: u64) -> Self {
        self.number_returned = Some(number_returned);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The declared number of features in the stream; 0 means unknown.
    pub fn feature_count(&self) -> u64 {
        self.number_returned.or(self.number_matched).unwrap_or(0)
    }
}

/// Per-request state shared by all encoders.
#[derive(Debug, Clone)]
pub struct EncodingContext {
    collection_id: String,
    schema: Arc<FeatureSchema>,
    crs_transformer: Option<Arc<dyn CrsTransformer>>,
    default_crs: EpsgCrs,
    all_properties: bool,
    properties: IndexSet<String>,
    max_multiplicity: usize,
}

impl EncodingContext {
    /// Create a context that encodes all properties of `schema`.
    pub fn new(collection_id: impl Into<String>, schema: Arc<FeatureSchema>) -> Self {
        Self {
            collection_id: collection_id.into(),
            schema,
            crs_transformer: None,
            default_crs: EpsgCrs::default(),
            all_properties: true,
            properties: IndexSet::new(),
            max_multiplicity: DEFAULT_MAX_MULTIPLICITY,
        }
    }

    pub fn with_crs_transformer(mut self, transformer: Arc<dyn CrsTransformer>) -> Self {
        self.crs_transformer = Some(transformer);
        self
    }

    /// CRS of the coordinates when no transformer is configured.
    pub fn with_default_crs(mut self, crs: EpsgCrs) -> Self {
        self.default_crs = crs;
        self
    }

    /// Restrict the output to the named top-level properties.
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.all_properties = false;
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_multiplicity(mut self, max_multiplicity: usize) -> Self {
        self.max_multiplicity = max_multiplicity;
        self
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn crs_transformer(&self) -> Option<&dyn CrsTransformer> {
        self.crs_transformer.as_deref()
    }

    /// The CRS coordinates are written in.
    pub fn target_crs(&self) -> EpsgCrs {
        self.crs_transformer
            .as_ref()
            .map_or(self.default_crs, |t| *t.target_crs())
    }

    pub fn all_properties(&self) -> bool {
        self.all_properties
    }

    pub fn max_multiplicity(&self) -> usize {
        self.max_multiplicity
    }

    /// Whether `property` is part of the requested projection.
    ///
    /// Projections select top-level properties; every property below a selected one is
    /// included. Id properties are always included.
    pub fn includes(&self, property: &FeatureSchema) -> bool {
        if self.all_properties || property.is_id() {
            return true;
        }
        property
            .full_path()
            .first()
            .is_some_and(|top| self.properties.contains(top))
            || self.properties.contains(&property.path("."))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crs::IdentityTransformer;
    use crate::schema::{transform, PropertyTransformations};
    use crate::test::schema::nested_schema;

    #[test]
    fn projection_selects_top_level_properties() {
        let schema = transform(
            &nested_schema(),
            &PropertyTransformations::new().with_flatten("."),
            1,
        );
        let context = EncodingContext::new("places", Arc::new(schema.clone()))
            .with_properties(["address"]);
        let included: Vec<_> = schema
            .properties()
            .iter()
            .filter(|p| context.includes(p))
            .map(|p| p.name())
            .collect();
        assert_eq!(included, ["id", "address.street", "address.city"]);
    }

    #[test]
    fn target_crs_follows_transformer() {
        let context = EncodingContext::new("places", Arc::new(nested_schema()))
            .with_default_crs(EpsgCrs::new(25832));
        assert_eq!(context.target_crs(), EpsgCrs::new(25832));

        let context = context.with_crs_transformer(Arc::new(IdentityTransformer::new(
            EpsgCrs::new(3857),
        )));
        assert_eq!(context.target_crs(), EpsgCrs::new(3857));
    }

    #[test]
    fn feature_count_prefers_returned() {
        let metadata = StreamMetadata::new().with_number_matched(100);
        assert_eq!(metadata.feature_count(), 100);
        assert_eq!(metadata.with_number_returned(10).feature_count(), 10);
        assert_eq!(StreamMetadata::new().feature_count(), 0);
    }
}
