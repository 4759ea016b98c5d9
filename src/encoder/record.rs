use std::fmt::Display;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::geometry::Geometry;

/// A typed, already flattened property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// Structured value that was not flattened.
    Json(Value),
}

impl PropertyValue {
    /// Convert a scalar JSON value. Arrays and objects are kept as [`PropertyValue::Json`].
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Integer(i),
                None => n
                    .as_f64()
                    .map_or(PropertyValue::Null, PropertyValue::Float),
            },
            Value::String(s) => PropertyValue::String(s.clone()),
            other => PropertyValue::Json(other.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "boolean",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Date(_) => "date",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::Json(_) => "json",
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Null => Ok(()),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PropertyValue::DateTime(dt) => {
                f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            PropertyValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<NaiveDate> for PropertyValue {
    fn from(value: NaiveDate) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(value)
    }
}

/// One feature as it flows into the tabular and binary encoders.
///
/// Property keys are the flattened paths produced by the schema transformer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    id: Option<String>,
    properties: IndexMap<String, PropertyValue>,
    geometry: Option<Geometry>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, path: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(path.into(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Build a record from a nested JSON object, flattening it the way the schema
    /// transformer names flattened properties: object members are joined with `separator`
    /// and array elements get their 0-based index as a path segment.
    pub fn from_nested(
        id: Option<String>,
        geometry: Option<Geometry>,
        properties: &Map<String, Value>,
        separator: &str,
    ) -> Self {
        let mut flat = IndexMap::new();
        for (key, value) in properties {
            flatten_into(&mut flat, key.clone(), value, separator);
        }
        Self {
            id,
            properties: flat,
            geometry,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyValue> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut IndexMap<String, PropertyValue> {
        &mut self.properties
    }

    /// Value at a flattened path, treating [`PropertyValue::Null`] as absent.
    pub fn get(&self, path: &str) -> Option<&PropertyValue> {
        self.properties.get(path).filter(|v| !v.is_null())
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }
}

fn flatten_into(
    flat: &mut IndexMap<String, PropertyValue>,
    path: String,
    value: &Value,
    separator: &str,
) {
    match value {
        Value::Object(members) => {
            for (key, member) in members {
                flatten_into(flat, format!("{path}{separator}{key}"), member, separator);
            }
        }
        Value::Array(elements) => {
            for (index, element) in elements.iter().enumerate() {
                flatten_into(flat, format!("{path}{separator}{index}"), element, separator);
            }
        }
        scalar => {
            flat.insert(path, PropertyValue::from_json(scalar));
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn flatten_nested_properties() {
        let properties = json!({
            "name": "Town hall",
            "address": {"street": "Main St", "city": "Springfield"},
            "tags": ["civic", "historic"],
            "contacts": [{"email": "a@example.com"}, {"email": "b@example.com"}],
            "floors": 3,
            "height": 12.5,
            "listed": true,
            "note": null
        });
        let record = FeatureRecord::from_nested(
            Some("1".to_string()),
            None,
            properties.as_object().unwrap(),
            ".",
        );
        let keys: Vec<_> = record.properties().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "name",
                "address.street",
                "address.city",
                "tags.0",
                "tags.1",
                "contacts.0.email",
                "contacts.1.email",
                "floors",
                "height",
                "listed",
                "note",
            ]
        );
        assert_eq!(record.get("floors"), Some(&PropertyValue::Integer(3)));
        assert_eq!(record.get("height"), Some(&PropertyValue::Float(12.5)));
        assert_eq!(record.get("note"), None);
        assert_eq!(record.id(), Some("1"));
    }

    #[test]
    fn display_values() {
        assert_eq!(PropertyValue::Null.to_string(), "");
        assert_eq!(PropertyValue::from(true).to_string(), "true");
        assert_eq!(PropertyValue::from(2.5).to_string(), "2.5");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(PropertyValue::from(date).to_string(), "2024-03-01");
        let datetime = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            PropertyValue::from(datetime).to_string(),
            "2024-03-01T12:30:00Z"
        );
    }
}
