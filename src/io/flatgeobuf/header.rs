//! Header block of a FlatGeobuf container.

use flatbuffers::{FlatBufferBuilder, WIPOffset};
use flatgeobuf::{ColumnArgs, Crs, CrsArgs, Header, HeaderArgs};
use log::warn;

use crate::crs::EpsgCrs;
use crate::schema::{FeatureSchema, GeometryType, SchemaType};

/// The column types written by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnType {
    Bool,
    Int,
    Double,
    String,
    DateTime,
}

impl ColumnType {
    fn from_schema(property: &FeatureSchema) -> Self {
        match property.schema_type() {
            SchemaType::Boolean => ColumnType::Bool,
            SchemaType::Integer => ColumnType::Int,
            SchemaType::Float => ColumnType::Double,
            SchemaType::Date | SchemaType::Datetime => ColumnType::DateTime,
            SchemaType::String => ColumnType::String,
            other => {
                warn!(
                    "property '{}' of type {other:?} is written as a string column",
                    property.name()
                );
                ColumnType::String
            }
        }
    }

    pub(crate) fn fgb_type(&self) -> flatgeobuf::ColumnType {
        match self {
            ColumnType::Bool => flatgeobuf::ColumnType::Bool,
            ColumnType::Int => flatgeobuf::ColumnType::Int,
            ColumnType::Double => flatgeobuf::ColumnType::Double,
            ColumnType::String => flatgeobuf::ColumnType::String,
            ColumnType::DateTime => flatgeobuf::ColumnType::DateTime,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::Double => "double",
            ColumnType::String => "string",
            ColumnType::DateTime => "datetime",
        }
    }
}

/// One entry of the header's column list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Column {
    /// Column name, also the key of the value in a feature record.
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Column {
    pub(crate) fn from_schema(property: &FeatureSchema) -> Self {
        Self {
            name: property.name().to_string(),
            column_type: ColumnType::from_schema(property),
            nullable: !property.is_required(),
            unique: property.is_id(),
            title: property.label().map(str::to_string),
            description: property.description().map(str::to_string),
        }
    }
}

pub(crate) fn fgb_geometry_type(geometry_type: GeometryType) -> flatgeobuf::GeometryType {
    match geometry_type {
        GeometryType::Point => flatgeobuf::GeometryType::Point,
        GeometryType::MultiPoint => flatgeobuf::GeometryType::MultiPoint,
        GeometryType::LineString => flatgeobuf::GeometryType::LineString,
        GeometryType::MultiLineString => flatgeobuf::GeometryType::MultiLineString,
        GeometryType::Polygon => flatgeobuf::GeometryType::Polygon,
        GeometryType::MultiPolygon => flatgeobuf::GeometryType::MultiPolygon,
        GeometryType::GeometryCollection => flatgeobuf::GeometryType::GeometryCollection,
        GeometryType::Any => flatgeobuf::GeometryType::Unknown,
    }
}

/// Everything that goes into the header block.
#[derive(Debug)]
pub(crate) struct HeaderSpec<'a> {
    pub name: &'a str,
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub geometry_type: GeometryType,
    pub has_z: bool,
    pub features_count: u64,
    pub crs: EpsgCrs,
    pub columns: &'a [Column],
}

fn build_column<'fbb>(
    builder: &mut FlatBufferBuilder<'fbb>,
    column: &Column,
) -> WIPOffset<flatgeobuf::Column<'fbb>> {
    let name = builder.create_string(&column.name);
    let title = column.title.as_deref().map(|t| builder.create_string(t));
    let description = column.description.as_deref().map(|d| builder.create_string(d));
    flatgeobuf::Column::create(
        builder,
        &ColumnArgs {
            name: Some(name),
            type_: column.column_type.fgb_type(),
            title,
            description,
            nullable: column.nullable,
            unique: column.unique,
            ..Default::default()
        },
    )
}

fn build_crs<'fbb>(builder: &mut FlatBufferBuilder<'fbb>, crs: &EpsgCrs) -> WIPOffset<Crs<'fbb>> {
    let org = builder.create_string("EPSG");
    Crs::create(
        builder,
        &CrsArgs {
            org: Some(org),
            code: crs.code(),
            ..Default::default()
        },
    )
}

/// Serialize the size-prefixed header into `builder`.
///
/// The caller takes the bytes from `builder.finished_data()`. No spatial index is written.
pub(crate) fn build_header(builder: &mut FlatBufferBuilder<'_>, spec: &HeaderSpec) {
    let columns: Vec<_> = spec
        .columns
        .iter()
        .map(|column| build_column(builder, column))
        .collect();
    let columns = builder.create_vector(&columns);
    let crs = build_crs(builder, &spec.crs);
    let name = builder.create_string(spec.name);
    let title = spec.title.map(|t| builder.create_string(t));
    let description = spec.description.map(|d| builder.create_string(d));

    let header = Header::create(
        builder,
        &HeaderArgs {
            name: Some(name),
            geometry_type: fgb_geometry_type(spec.geometry_type),
            has_z: spec.has_z,
            columns: Some(columns),
            features_count: spec.features_count,
            index_node_size: 0,
            crs: Some(crs),
            title,
            description,
            ..Default::default()
        },
    );
    builder.finish_size_prefixed(header, None);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::schema::simple_schema;

    #[test]
    fn header_round_trip() {
        let schema = simple_schema();
        let columns: Vec<_> = schema
            .properties()
            .iter()
            .filter(|p| !p.is_spatial())
            .map(Column::from_schema)
            .collect();
        let spec = HeaderSpec {
            name: "buildings",
            title: Some("Buildings"),
            description: None,
            geometry_type: GeometryType::Polygon,
            has_z: false,
            features_count: 42,
            crs: EpsgCrs::new(25832),
            columns: &columns,
        };
        let mut builder = FlatBufferBuilder::new();
        build_header(&mut builder, &spec);

        let header = flatgeobuf::size_prefixed_root_as_header(builder.finished_data()).unwrap();
        assert_eq!(header.name(), Some("buildings"));
        assert_eq!(header.title(), Some("Buildings"));
        assert_eq!(header.geometry_type(), flatgeobuf::GeometryType::Polygon);
        assert_eq!(header.features_count(), 42);
        assert_eq!(header.index_node_size(), 0);
        assert!(!header.has_z());
        assert_eq!(header.crs().unwrap().code(), 25832);

        let columns = header.columns().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns.get(0).name(), "id");
        assert!(columns.get(0).unique());
        assert_eq!(columns.get(1).name(), "name");
        assert_eq!(columns.get(1).type_(), flatgeobuf::ColumnType::String);
        assert!(columns.get(1).nullable());
    }

    #[test]
    fn column_type_mapping() {
        let column = |schema_type| Column::from_schema(&FeatureSchema::new("p", schema_type)).column_type;
        assert_eq!(column(SchemaType::Boolean), ColumnType::Bool);
        assert_eq!(column(SchemaType::Integer), ColumnType::Int);
        assert_eq!(column(SchemaType::Float), ColumnType::Double);
        assert_eq!(column(SchemaType::Date), ColumnType::DateTime);
        assert_eq!(column(SchemaType::Datetime), ColumnType::DateTime);
        assert_eq!(column(SchemaType::String), ColumnType::String);
        assert_eq!(column(SchemaType::Object), ColumnType::String);
        assert_eq!(column(SchemaType::ValueArray), ColumnType::String);
    }
}
