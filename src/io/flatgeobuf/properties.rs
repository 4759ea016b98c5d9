//! Serialization of feature properties into the FlatGeobuf property blob.

use log::debug;

use crate::encoder::{FeatureRecord, PropertyValue};
use crate::error::{EncodingError, Result};
use crate::io::flatgeobuf::header::{Column, ColumnType};

/// Scratch buffer for the properties of one feature.
///
/// Writes fail with [`EncodingError::BufferOverflow`] instead of reallocating, so a feature
/// is either serialized completely or not at all.
#[derive(Debug)]
pub(crate) struct PropertyBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl PropertyBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }

    fn grow(&mut self) {
        self.capacity = (self.capacity * 2).max(64);
        self.bytes.reserve(self.capacity - self.bytes.len());
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        let needed = self.bytes.len() + data.len();
        if needed > self.capacity {
            return Err(EncodingError::BufferOverflow {
                needed,
                available: self.capacity,
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    fn put_str(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| EncodingError::ColumnTypeMismatch {
            column: String::new(),
            expected: "string",
            found: format!("string of {} bytes", value.len()),
        })?;
        self.put(&len.to_le_bytes())?;
        self.put(value.as_bytes())
    }
}

fn mismatch(column: &Column, value: &PropertyValue) -> EncodingError {
    EncodingError::ColumnTypeMismatch {
        column: column.name.clone(),
        expected: column.column_type.name(),
        found: format!("{} value '{value}'", value.type_name()),
    }
}

fn write_value(
    buffer: &mut PropertyBuffer,
    index: u16,
    column: &Column,
    value: &PropertyValue,
) -> Result<()> {
    buffer.put(&index.to_le_bytes())?;
    match (column.column_type, value) {
        (ColumnType::Bool, PropertyValue::Bool(b)) => buffer.put(&[u8::from(*b)]),
        // narrowed to the declared column width
        (ColumnType::Int, PropertyValue::Integer(i)) => buffer.put(&(*i as i32).to_le_bytes()),
        (ColumnType::Double, PropertyValue::Float(f)) => buffer.put(&f.to_le_bytes()),
        (ColumnType::Double, PropertyValue::Integer(i)) => {
            buffer.put(&(*i as f64).to_le_bytes())
        }
        (ColumnType::String, value) => buffer.put_str(&value.to_string()),
        (
            ColumnType::DateTime,
            value @ (PropertyValue::Date(_) | PropertyValue::DateTime(_) | PropertyValue::String(_)),
        ) => buffer.put_str(&value.to_string()),
        (_, value) => Err(mismatch(column, value)),
    }
}

fn encode_properties(
    buffer: &mut PropertyBuffer,
    columns: &[Column],
    record: &FeatureRecord,
) -> Result<()> {
    for (index, column) in columns.iter().enumerate() {
        let Some(value) = record.get(&column.name) else {
            continue;
        };
        let index = u16::try_from(index)
            .map_err(|_| EncodingError::Schema(format!("too many columns: {}", columns.len())))?;
        write_value(buffer, index, column, value)?;
    }
    Ok(())
}

/// Serialize the values of `record` for `columns` into `buffer`.
///
/// Absent and null values are skipped. When the buffer overflows its capacity is doubled
/// and the feature is serialized again from the start.
pub(crate) fn write_properties(
    buffer: &mut PropertyBuffer,
    columns: &[Column],
    record: &FeatureRecord,
) -> Result<()> {
    loop {
        buffer.clear();
        match encode_properties(buffer, columns, record) {
            Err(EncodingError::BufferOverflow { needed, available }) => {
                debug!("property buffer of {available} bytes too small for {needed} bytes");
                buffer.grow();
            }
            Err(err) => {
                buffer.clear();
                return Err(err);
            }
            Ok(()) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;

    use super::*;
    use crate::schema::{FeatureSchema, SchemaType};

    fn columns() -> Vec<Column> {
        [
            FeatureSchema::new("flag", SchemaType::Boolean),
            FeatureSchema::new("count", SchemaType::Integer),
            FeatureSchema::new("ratio", SchemaType::Float),
            FeatureSchema::new("label", SchemaType::String),
            FeatureSchema::new("day", SchemaType::Date),
        ]
        .iter()
        .map(Column::from_schema)
        .collect()
    }

    #[test]
    fn value_encoding() {
        let record = FeatureRecord::new()
            .with_property("flag", true)
            .with_property("count", 7)
            .with_property("label", "ab")
            .with_property("day", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let mut buffer = PropertyBuffer::new(1024);
        write_properties(&mut buffer, &columns(), &record).unwrap();

        let mut expected = vec![];
        expected.extend([0, 0, 1]);
        expected.extend([1, 0]);
        expected.extend(7i32.to_le_bytes());
        // ratio is absent
        expected.extend([3, 0]);
        expected.extend(2u32.to_le_bytes());
        expected.extend(b"ab");
        expected.extend([4, 0]);
        expected.extend(10u32.to_le_bytes());
        expected.extend(b"2024-01-02");
        assert_eq!(buffer.as_slice(), expected);
    }

    #[test]
    fn wide_integers_are_truncated() {
        let record = FeatureRecord::new().with_property("count", i64::from(i32::MAX) + 1);
        let mut buffer = PropertyBuffer::new(1024);
        write_properties(&mut buffer, &columns(), &record).unwrap();
        assert_eq!(buffer.as_slice()[2..], i32::MIN.to_le_bytes());
    }

    #[test]
    fn growth_does_not_change_output() {
        let long = "x".repeat(3000);
        let record = FeatureRecord::new()
            .with_property("flag", false)
            .with_property("label", long.as_str())
            .with_property("ratio", 0.5);

        let mut small = PropertyBuffer::new(1024);
        write_properties(&mut small, &columns(), &record).unwrap();
        assert_eq!(small.capacity(), 4096);

        let mut large = PropertyBuffer::new(1 << 16);
        write_properties(&mut large, &columns(), &record).unwrap();
        assert_eq!(large.capacity(), 1 << 16);
        assert_eq!(small.as_slice(), large.as_slice());
    }

    #[test]
    fn type_mismatch_leaves_buffer_empty() {
        let record = FeatureRecord::new()
            .with_property("flag", true)
            .with_property("count", "seven");
        let mut buffer = PropertyBuffer::new(1024);
        let err = write_properties(&mut buffer, &columns(), &record).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::ColumnTypeMismatch { ref column, .. } if column == "count"
        ));
        assert!(!err.is_fatal());
        assert!(buffer.is_empty());
    }
}
