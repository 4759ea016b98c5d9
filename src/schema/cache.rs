//! Memoization of derived schemas.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::error::Result;
use crate::schema::{FeatureSchema, FlattenedSchemaDeriver, PropertyTransformations};

/// Identifies one derived schema.
///
/// Besides the collection the key carries a fingerprint of everything the derivation
/// depends on, so a changed configuration never hits a stale entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaCacheKey {
    api_id: String,
    collection_id: String,
    schema_version: String,
    configuration: u64,
}

impl SchemaCacheKey {
    pub fn new(
        api_id: impl Into<String>,
        collection_id: impl Into<String>,
        schema_version: impl Into<String>,
        transformations: &PropertyTransformations,
        max_multiplicity: usize,
    ) -> Self {
        Self {
            api_id: api_id.into(),
            collection_id: collection_id.into(),
            schema_version: schema_version.into(),
            configuration: transformations
                .fingerprint()
                .rotate_left(16)
                .wrapping_add(max_multiplicity as u64),
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }
}

/// Produces the output schema of a collection from its source schema.
pub trait SchemaDeriver {
    fn derive_schema(
        &self,
        schema: &FeatureSchema,
        transformations: &PropertyTransformations,
        max_multiplicity: usize,
    ) -> Result<FeatureSchema>;
}

/// Thread-safe cache of derived schemas.
///
/// Entries are never evicted; the number of keys is bounded by the configured collections.
#[derive(Debug)]
pub struct SchemaCache<D = FlattenedSchemaDeriver> {
    deriver: D,
    entries: RwLock<HashMap<SchemaCacheKey, Arc<FeatureSchema>>>,
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(FlattenedSchemaDeriver::default())
    }
}

impl<D: SchemaDeriver> SchemaCache<D> {
    pub fn new(deriver: D) -> Self {
        Self {
            deriver,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the derived schema for `key`, deriving and storing it on first use.
    ///
    /// Repeated calls with an equal key return the same shared instance.
    pub fn get_schema(
        &self,
        key: &SchemaCacheKey,
        schema: &FeatureSchema,
        transformations: &PropertyTransformations,
        max_multiplicity: usize,
    ) -> Result<Arc<FeatureSchema>> {
        if let Some(cached) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(cached.clone());
        }

        let derived = self
            .deriver
            .derive_schema(schema, transformations, max_multiplicity)?;
        debug!(
            "derived schema for collection '{}' with {} properties",
            key.collection_id,
            derived.properties().len()
        );

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have won the race, keep its instance.
        Ok(entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(derived))
            .clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
