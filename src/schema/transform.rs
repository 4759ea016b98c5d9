//! Rewriting of schema trees into the flat shape the tabular and binary formats need.

use std::hash::{DefaultHasher, Hash, Hasher};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::encoder::{FeatureRecord, PropertyValue};
use crate::error::Result;
use crate::schema::{
    Codelist, Constraints, FeatureSchema, SchemaDeriver, SchemaType, SchemaVisitor,
};

/// Default cap on the number of array elements fanned out into flat properties.
pub const DEFAULT_MAX_MULTIPLICITY: usize = 3;

/// Rule applied to the property at one source path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyTransformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,

    #[serde(default)]
    pub remove: bool,

    /// Id of the codelist whose labels replace the property values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codelist: Option<String>,
}

impl PropertyTransformation {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            rename: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn remove() -> Self {
        Self {
            remove: true,
            ..Default::default()
        }
    }

    pub fn codelist(id: impl Into<String>) -> Self {
        Self {
            codelist: Some(id.into()),
            ..Default::default()
        }
    }
}

/// The transformation rules configured for one collection.
///
/// Rules are keyed by the dot-joined source path of a property, e.g. `address.street`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyTransformations {
    /// Separator joining the path segments of flattened properties. Without a separator
    /// nested properties are left as they are.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flatten: Option<String>,

    #[serde(default)]
    rules: IndexMap<String, PropertyTransformation>,

    #[serde(default)]
    codelists: IndexMap<String, Codelist>,
}

impl PropertyTransformations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_flatten(mut self, separator: impl Into<String>) -> Self {
        self.flatten = Some(separator.into());
        self
    }

    pub fn with_rule(mut self, path: impl Into<String>, rule: PropertyTransformation) -> Self {
        self.rules.insert(path.into(), rule);
        self
    }

    pub fn with_codelist(mut self, id: impl Into<String>, codelist: Codelist) -> Self {
        self.codelists.insert(id.into(), codelist);
        self
    }

    pub fn flatten_separator(&self) -> Option<&str> {
        self.flatten.as_deref()
    }

    pub fn rule(&self, path: &str) -> Option<&PropertyTransformation> {
        self.rules.get(path)
    }

    /// Structural hash of the configuration, stable for the lifetime of the process.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        serde_json::to_vec(self).unwrap_or_default().hash(&mut hasher);
        hasher.finish()
    }

    /// Apply value-level rules (codelist substitution) to one flattened property value.
    pub fn transform_value(&self, flat_path: &str, value: PropertyValue) -> PropertyValue {
        let separator = self.flatten.as_deref().unwrap_or(".");
        let codelist = self
            .rules
            .get(&source_path(flat_path, separator))
            .and_then(|rule| rule.codelist.as_ref())
            .and_then(|id| self.codelists.get(id));
        match codelist {
            Some(codelist) if !value.is_null() => {
                PropertyValue::String(codelist.lookup(&value.to_string()).to_string())
            }
            _ => value,
        }
    }

    /// Apply value-level rules to every property of a record.
    pub fn transform_record(&self, mut record: FeatureRecord) -> FeatureRecord {
        for (path, value) in record.properties_mut().iter_mut() {
            let current = std::mem::replace(value, PropertyValue::Null);
            *value = self.transform_value(path, current);
        }
        record
    }
}

/// Strip array indices from a flattened path and join the rest with `.`.
fn source_path(flat_path: &str, separator: &str) -> String {
    flat_path
        .split(separator)
        .filter(|segment| segment.parse::<usize>().is_err())
        .join(".")
}

/// Flattens and rewrites a schema tree according to [`PropertyTransformations`].
///
/// Visiting a property yields a list: nothing for removed properties, one node for plain
/// properties and one node per fanned-out element for arrays.
#[derive(Debug, Clone, Copy)]
pub struct SchemaTransformer<'a> {
    transformations: &'a PropertyTransformations,
    max_multiplicity: usize,
}

impl<'a> SchemaTransformer<'a> {
    pub fn new(transformations: &'a PropertyTransformations, max_multiplicity: usize) -> Self {
        Self {
            transformations,
            max_multiplicity,
        }
    }

    pub fn transform(&self, schema: &FeatureSchema) -> FeatureSchema {
        schema
            .accept(self)
            .pop()
            .unwrap_or_else(|| schema.shallow_clone())
    }

    fn multiplicity(&self, schema: &FeatureSchema) -> usize {
        schema
            .constraints()
            .and_then(|c| c.max_occurrence)
            .map_or(self.max_multiplicity, |max| max.min(self.max_multiplicity))
    }
}

/// Transform `schema` with `transformations`, fanning out arrays up to `max_multiplicity`.
pub fn transform(
    schema: &FeatureSchema,
    transformations: &PropertyTransformations,
    max_multiplicity: usize,
) -> FeatureSchema {
    SchemaTransformer::new(transformations, max_multiplicity).transform(schema)
}

fn flat_named(mut schema: FeatureSchema, separator: &str) -> FeatureSchema {
    if !schema.is_spatial() {
        let name = schema.path(separator);
        schema.set_name(name);
    }
    schema
}

fn optional(mut schema: FeatureSchema) -> FeatureSchema {
    let constraints = schema.constraints().cloned().map(|c| Constraints {
        required: false,
        ..c
    });
    schema.set_constraints(constraints);
    schema
}

impl SchemaVisitor for SchemaTransformer<'_> {
    type Output = Vec<FeatureSchema>;

    fn visit(
        &self,
        schema: &FeatureSchema,
        parents: &[&FeatureSchema],
        children: Vec<Vec<FeatureSchema>>,
    ) -> Vec<FeatureSchema> {
        let mut children: Vec<FeatureSchema> = children.into_iter().flatten().collect();
        let mut node = schema.shallow_clone();

        if parents.is_empty() {
            node.set_properties(children);
            return vec![node];
        }

        let rule = self.transformations.rule(&schema.path("."));
        if rule.is_some_and(|r| r.remove) {
            return vec![];
        }

        let depth = node.full_path().len();
        if let Some(new_name) = rule.and_then(|r| r.rename.as_deref()) {
            let index = depth.saturating_sub(1);
            node.replace_segment(index, new_name);
            node.set_name(new_name.to_string());
            for child in children.iter_mut() {
                child.replace_segment(index, new_name);
            }
        }

        if rule.is_some_and(|r| r.codelist.is_some()) && node.is_value() {
            node.set_schema_type(SchemaType::String);
        }

        let Some(separator) = self.transformations.flatten_separator() else {
            if node.is_object() || node.is_array() {
                node.set_properties(children);
            }
            return vec![node];
        };

        match node.schema_type() {
            SchemaType::Object => children
                .into_iter()
                .map(|child| flat_named(child, separator))
                .collect(),
            SchemaType::ObjectArray => {
                let mut fanned = vec![];
                for index in 0..self.multiplicity(&node) {
                    let segment = index.to_string();
                    for child in &children {
                        if child.is_spatial() {
                            if index == 0 {
                                fanned.push(child.clone());
                            }
                            continue;
                        }
                        let mut element = optional(child.clone());
                        element.insert_segment(depth, &segment);
                        fanned.push(flat_named(element, separator));
                    }
                }
                fanned
            }
            SchemaType::ValueArray => (0..self.multiplicity(&node))
                .map(|index| {
                    let mut element = node.shallow_clone();
                    element.set_schema_type(node.value_type().unwrap_or(SchemaType::String));
                    element.set_value_type(None);
                    element.set_constraints(None);
                    element.insert_segment(depth, &index.to_string());
                    flat_named(element, separator)
                })
                .collect(),
            _ => vec![node],
        }
    }
}

/// Derives the flat schema used by the tabular and binary encoders.
#[derive(Debug, Clone, Default)]
pub struct FlattenedSchemaDeriver {
    /// Separator used when the transformations do not configure flattening themselves.
    pub default_separator: Option<String>,

    /// Drop every geometry except the primary one.
    pub primary_geometry_only: bool,
}

impl FlattenedSchemaDeriver {
    pub fn new(default_separator: impl Into<String>) -> Self {
        Self {
            default_separator: Some(default_separator.into()),
            primary_geometry_only: false,
        }
    }
}

impl SchemaDeriver for FlattenedSchemaDeriver {
    fn derive_schema(
        &self,
        schema: &FeatureSchema,
        transformations: &PropertyTransformations,
        max_multiplicity: usize,
    ) -> Result<FeatureSchema> {
        schema.validate()?;

        let defaulted;
        let transformations = match (&self.default_separator, transformations.flatten_separator())
        {
            (Some(separator), None) => {
                defaulted = transformations.clone().with_flatten(separator.clone());
                &defaulted
            }
            _ => transformations,
        };
        let mut derived = transform(schema, transformations, max_multiplicity);

        if self.primary_geometry_only {
            let primary = derived.primary_geometry().map(|p| p.full_path().to_vec());
            let properties = derived
                .take_properties()
                .into_iter()
                .filter(|p| !p.is_spatial() || Some(p.full_path()) == primary.as_deref())
                .collect();
            derived.set_properties(properties);
        }
        Ok(derived)
    }
}
