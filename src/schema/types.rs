use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, Result};

/// The type of a property in a [`FeatureSchema`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    Boolean,
    Integer,
    Float,
    String,
    Date,
    Datetime,
    Object,
    ObjectArray,
    ValueArray,
    Geometry,
}

impl SchemaType {
    pub fn is_object(&self) -> bool {
        matches!(self, SchemaType::Object | SchemaType::ObjectArray)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, SchemaType::ObjectArray | SchemaType::ValueArray)
    }

    /// Scalar, non-spatial value types.
    pub fn is_value(&self) -> bool {
        !self.is_object() && !self.is_array() && *self != SchemaType::Geometry
    }
}

/// Declared geometry type of a GEOMETRY property.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
    Any,
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GeometryType::Point => "Point",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::LineString => "LineString",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
            GeometryType::Any => "Geometry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Id,
    PrimaryGeometry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default)]
    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    /// Upper bound on the number of elements of an array property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_occurrence: Option<usize>,
}

/// Immutable description of a feature type or one of its properties.
///
/// The root of a schema tree is the feature type itself; its `full_path` is empty and every
/// property below it carries the path of names leading to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSchema {
    name: String,

    #[serde(default)]
    full_path: Vec<String>,

    #[serde(rename = "type")]
    schema_type: SchemaType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    value_type: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    geometry_type: Option<GeometryType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    constraints: Option<Constraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<FeatureSchema>,
}

impl FeatureSchema {
    /// Create the root of a schema tree for the feature type `name`.
    pub fn feature_type(name: impl Into<String>) -> Self {
        Self {
            full_path: vec![],
            ..Self::new(name, SchemaType::Object)
        }
    }

    /// Create a property. Its path is rebased when it is attached to a parent.
    pub fn new(name: impl Into<String>, schema_type: SchemaType) -> Self {
        let name = name.into();
        Self {
            full_path: vec![name.clone()],
            name,
            schema_type,
            value_type: None,
            geometry_type: None,
            role: None,
            constraints: None,
            label: None,
            description: None,
            properties: vec![],
        }
    }

    /// Parse a schema tree from its JSON configuration form and resolve all paths.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut schema: FeatureSchema = serde_json::from_str(json)?;
        let root_path = std::mem::take(&mut schema.full_path);
        for property in schema.properties.iter_mut() {
            property.rebase(&root_path);
        }
        schema.full_path = root_path;
        Ok(schema)
    }

    pub fn with_geometry_type(mut self, geometry_type: GeometryType) -> Self {
        self.geometry_type = Some(geometry_type);
        self
    }

    pub fn with_value_type(mut self, value_type: SchemaType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach child properties, rebasing their paths below this node.
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = FeatureSchema>) -> Self {
        for mut property in properties {
            property.rebase(&self.full_path);
            self.properties.push(property);
        }
        self
    }

    fn rebase(&mut self, parent_path: &[String]) {
        let mut full_path = parent_path.to_vec();
        full_path.push(self.name.clone());
        self.full_path = full_path;
        let path = self.full_path.clone();
        for property in self.properties.iter_mut() {
            property.rebase(&path);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_path(&self) -> &[String] {
        &self.full_path
    }

    /// The full path joined with `separator`.
    pub fn path(&self, separator: &str) -> String {
        self.full_path.join(separator)
    }

    pub fn schema_type(&self) -> SchemaType {
        self.schema_type
    }

    /// Element type of a VALUE_ARRAY property.
    pub fn value_type(&self) -> Option<SchemaType> {
        self.value_type
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry_type
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn constraints(&self) -> Option<&Constraints> {
        self.constraints.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn properties(&self) -> &[FeatureSchema] {
        &self.properties
    }

    pub fn is_required(&self) -> bool {
        self.constraints.as_ref().is_some_and(|c| c.required)
    }

    pub fn is_id(&self) -> bool {
        self.role == Some(Role::Id)
    }

    pub fn is_spatial(&self) -> bool {
        self.schema_type == SchemaType::Geometry
    }

    pub fn is_primary_geometry(&self) -> bool {
        self.is_spatial() && self.role == Some(Role::PrimaryGeometry)
    }

    pub fn is_object(&self) -> bool {
        self.schema_type.is_object()
    }

    pub fn is_array(&self) -> bool {
        self.schema_type.is_array()
    }

    pub fn is_value(&self) -> bool {
        self.schema_type.is_value()
    }

    /// All properties below this node, depth-first in source order.
    pub fn all_nested_properties(&self) -> Vec<&FeatureSchema> {
        let mut nested = vec![];
        for property in &self.properties {
            nested.push(property);
            nested.extend(property.all_nested_properties());
        }
        nested
    }

    /// The geometry encoders treat as the feature geometry.
    ///
    /// This is the property with the primary geometry role or, if no property has that role,
    /// the first geometry property.
    pub fn primary_geometry(&self) -> Option<&FeatureSchema> {
        let nested = self.all_nested_properties();
        nested
            .iter()
            .find(|p| p.is_primary_geometry())
            .or_else(|| nested.iter().find(|p| p.is_spatial()))
            .copied()
    }

    /// Check the invariants of a schema tree.
    pub fn validate(&self) -> Result<()> {
        let primary = self
            .all_nested_properties()
            .into_iter()
            .filter(|p| p.is_primary_geometry())
            .count();
        if primary > 1 {
            return Err(EncodingError::Schema(format!(
                "feature type '{}' declares {primary} primary geometries",
                self.name
            )));
        }
        if let Some(property) = self
            .all_nested_properties()
            .into_iter()
            .find(|p| p.role == Some(Role::PrimaryGeometry) && !p.is_spatial())
        {
            return Err(EncodingError::Schema(format!(
                "property '{}' has the primary geometry role but is not a geometry",
                property.path(".")
            )));
        }
        Ok(())
    }

    /// Visit this tree bottom-up, see [`SchemaVisitor`].
    pub fn accept<V: SchemaVisitor>(&self, visitor: &V) -> V::Output {
        let mut parents = vec![];
        self.accept_with_parents(visitor, &mut parents)
    }

    fn accept_with_parents<'a, V: SchemaVisitor>(
        &'a self,
        visitor: &V,
        parents: &mut Vec<&'a FeatureSchema>,
    ) -> V::Output {
        parents.push(self);
        let mut children = Vec::with_capacity(self.properties.len());
        for property in &self.properties {
            children.push(property.accept_with_parents(visitor, parents));
        }
        parents.pop();
        visitor.visit(self, parents, children)
    }

    /// Clone this node without its properties.
    pub(crate) fn shallow_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            full_path: self.full_path.clone(),
            schema_type: self.schema_type,
            value_type: self.value_type,
            geometry_type: self.geometry_type,
            role: self.role,
            constraints: self.constraints.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            properties: vec![],
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_schema_type(&mut self, schema_type: SchemaType) {
        self.schema_type = schema_type;
    }

    pub(crate) fn set_value_type(&mut self, value_type: Option<SchemaType>) {
        self.value_type = value_type;
    }

    pub(crate) fn set_constraints(&mut self, constraints: Option<Constraints>) {
        self.constraints = constraints;
    }

    pub(crate) fn set_properties(&mut self, properties: Vec<FeatureSchema>) {
        self.properties = properties;
    }

    pub(crate) fn take_properties(&mut self) -> Vec<FeatureSchema> {
        std::mem::take(&mut self.properties)
    }

    /// Replace the path segment at `index` in this node and all nodes below it.
    pub(crate) fn replace_segment(&mut self, index: usize, segment: &str) {
        if let Some(existing) = self.full_path.get_mut(index) {
            *existing = segment.to_string();
        }
        for property in self.properties.iter_mut() {
            property.replace_segment(index, segment);
        }
    }

    /// Insert a path segment at `index` in this node and all nodes below it.
    pub(crate) fn insert_segment(&mut self, index: usize, segment: &str) {
        if index <= self.full_path.len() {
            self.full_path.insert(index, segment.to_string());
        }
        for property in self.properties.iter_mut() {
            property.insert_segment(index, segment);
        }
    }
}

/// A bottom-up visitor over a schema tree.
///
/// `children` holds the outputs for the properties of `schema` in source order and `parents`
/// the chain of ancestors from the root.
pub trait SchemaVisitor {
    type Output;

    fn visit(
        &self,
        schema: &FeatureSchema,
        parents: &[&FeatureSchema],
        children: Vec<Self::Output>,
    ) -> Self::Output;
}
