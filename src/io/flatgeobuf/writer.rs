use std::io::Write;

use flatbuffers::FlatBufferBuilder;
use flatgeobuf::{Feature, FeatureArgs};
use geozero::GeozeroGeometry;
use log::{debug, warn};

use crate::encoder::{EncoderState, EncodingContext, FeatureEncoder, FeatureRecord, StreamMetadata};
use crate::error::Result;
use crate::geometry::{repair, Geometry};
use crate::io::flatgeobuf::geometry::{GeometryPart, GeometryWriter};
use crate::io::flatgeobuf::header::{build_header, Column, HeaderSpec};
use crate::io::flatgeobuf::properties::{write_properties, PropertyBuffer};
use crate::io::flatgeobuf::MAGIC_BYTES;
use crate::schema::GeometryType;

/// Options for the FlatGeobuf encoder.
#[derive(Debug, Clone)]
pub struct FlatgeobufOptions {
    /// Layer name written to the header. Defaults to the collection id.
    pub name: Option<String>,

    pub title: Option<String>,

    pub description: Option<String>,

    /// Initial size of the property scratch buffer in bytes.
    pub initial_buffer_size: usize,

    /// Write z values.
    pub has_z: bool,

    /// Repair invalid geometries instead of writing them as they are.
    pub repair_geometries: bool,
}

impl Default for FlatgeobufOptions {
    fn default() -> Self {
        Self {
            name: None,
            title: None,
            description: None,
            initial_buffer_size: 1024,
            has_z: false,
            repair_geometries: true,
        }
    }
}

/// Streams features into a FlatGeobuf container.
///
/// The header is written by [`FeatureEncoder::on_start`]; every feature becomes one
/// size-prefixed record. A feature that cannot be encoded is logged and skipped, the
/// stream continues. No spatial index is written.
pub struct FlatgeobufEncoder<'a, W: Write> {
    context: &'a EncodingContext,
    options: FlatgeobufOptions,
    writer: W,
    builder: FlatBufferBuilder<'static>,
    columns: Vec<Column>,
    geometry_type: GeometryType,
    properties: PropertyBuffer,
    state: EncoderState,
    written: u64,
    skipped: u64,
}

impl<'a, W: Write> FlatgeobufEncoder<'a, W> {
    pub fn new(context: &'a EncodingContext, writer: W) -> Self {
        Self::with_options(context, writer, Default::default())
    }

    pub fn with_options(context: &'a EncodingContext, writer: W, options: FlatgeobufOptions) -> Self {
        let schema = context.schema();
        // only the primary geometry is written, any other geometry property is dropped
        let columns = schema
            .properties()
            .iter()
            .filter(|p| !p.is_spatial() && context.includes(p))
            .map(Column::from_schema)
            .collect();
        let geometry_type = schema
            .primary_geometry()
            .and_then(|p| p.geometry_type())
            .unwrap_or(GeometryType::Any);
        let properties = PropertyBuffer::new(options.initial_buffer_size);
        Self {
            context,
            options,
            writer,
            builder: FlatBufferBuilder::new(),
            columns,
            geometry_type,
            properties,
            state: EncoderState::default(),
            written: 0,
            skipped: 0,
        }
    }

    /// Number of features written so far.
    pub fn written_features(&self) -> u64 {
        self.written
    }

    /// Number of features skipped because they could not be encoded.
    pub fn skipped_features(&self) -> u64 {
        self.skipped
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn prepare_geometry(&self, geometry: &Geometry) -> Result<GeometryPart> {
        let geometry = if self.options.repair_geometries && !geometry.is_valid() {
            repair(geometry, self.geometry_type)?
        } else {
            geometry.clone()
        };
        let geometry = geometry.coerce_to(self.geometry_type)?;

        let mut writer = GeometryWriter::new(self.options.has_z);
        geometry.process_geom(&mut writer)?;
        Ok(writer.finish()?)
    }

    fn encode_feature(&mut self, record: &FeatureRecord) -> Result<()> {
        let geometry = record
            .geometry()
            .map(|geometry| self.prepare_geometry(geometry))
            .transpose()?;
        write_properties(&mut self.properties, &self.columns, record)?;

        self.builder.reset();
        let geometry = geometry
            .map(|part| part.build(&mut self.builder, self.geometry_type == GeometryType::Any));
        let properties = (!self.properties.is_empty())
            .then(|| self.builder.create_vector(self.properties.as_slice()));

        let feature = Feature::create(
            &mut self.builder,
            &FeatureArgs {
                geometry,
                properties,
                ..Default::default()
            },
        );
        self.builder.finish_size_prefixed(feature, None);
        self.writer.write_all(self.builder.finished_data())?;
        Ok(())
    }
}

impl<W: Write> FeatureEncoder for FlatgeobufEncoder<'_, W> {
    type Feature = FeatureRecord;

    fn on_start(&mut self, metadata: &StreamMetadata) -> Result<()> {
        self.state.start()?;
        self.writer.write_all(&MAGIC_BYTES)?;

        let spec = HeaderSpec {
            name: self
                .options
                .name
                .as_deref()
                .unwrap_or(self.context.collection_id()),
            title: self.options.title.as_deref(),
            description: self.options.description.as_deref(),
            geometry_type: self.geometry_type,
            has_z: self.options.has_z,
            features_count: metadata.feature_count(),
            crs: self.context.target_crs(),
            columns: &self.columns,
        };
        self.builder.reset();
        build_header(&mut self.builder, &spec);
        self.writer.write_all(self.builder.finished_data())?;
        debug!(
            "started FlatGeobuf stream for '{}' with {} columns and geometry type {}",
            self.context.collection_id(),
            self.columns.len(),
            self.geometry_type
        );
        Ok(())
    }

    fn on_feature(&mut self, feature: &FeatureRecord) -> Result<()> {
        self.state.check_feature()?;
        match self.encode_feature(feature) {
            Ok(()) => {
                self.written += 1;
                Ok(())
            }
            Err(err) if !err.is_fatal() => {
                warn!(
                    "skipping feature '{}' of collection '{}': {err}",
                    feature.id().unwrap_or_default(),
                    self.context.collection_id()
                );
                self.skipped += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn on_end(&mut self, _metadata: &StreamMetadata) -> Result<()> {
        self.state.end()?;
        self.writer.flush()?;
        debug!(
            "finished FlatGeobuf stream for '{}': {} written, {} skipped, property buffer {} bytes",
            self.context.collection_id(),
            self.written,
            self.skipped,
            self.properties.capacity()
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::encoder::encode_features;
    use crate::error::EncodingError;
    use crate::schema::{FeatureSchema, Role, SchemaType};
    use crate::test::fgb::{decode_features, decode_header};
    use crate::test::geometry::{bowtie, square};
    use crate::test::schema::simple_schema;

    fn encode(context: &EncodingContext, options: FlatgeobufOptions, features: &[FeatureRecord]) -> (Vec<u8>, u64, u64) {
        let mut encoder = FlatgeobufEncoder::with_options(context, Vec::<u8>::new(), options);
        let metadata = StreamMetadata::new().with_number_returned(features.len() as u64);
        encode_features(&mut encoder, &metadata, features).unwrap();
        let (written, skipped) = (encoder.written_features(), encoder.skipped_features());
        (encoder.into_inner(), written, skipped)
    }

    fn building(id: &str, geometry: Geometry) -> FeatureRecord {
        FeatureRecord::new()
            .with_id(id)
            .with_property("id", id)
            .with_property("name", format!("building {id}"))
            .with_geometry(geometry)
    }

    #[test]
    fn valid_and_self_intersecting_polygons() {
        let context = EncodingContext::new("buildings", Arc::new(simple_schema()));
        let features = [building("1", square()), building("2", bowtie())];
        let (bytes, written, skipped) = encode(&context, Default::default(), &features);
        assert_eq!((written, skipped), (2, 0));

        assert_eq!(bytes[..8], MAGIC_BYTES);
        let header = decode_header(&bytes);
        assert_eq!(header.geometry_type(), flatgeobuf::GeometryType::Polygon);
        assert_eq!(header.features_count(), 2);
        assert_eq!(header.crs().unwrap().code(), 4326);

        let records = decode_features(&bytes);
        assert_eq!(records.len(), 2);
        let repaired = flatgeobuf::size_prefixed_root_as_feature(records[1]).unwrap();
        let xy: Vec<f64> = repaired.geometry().unwrap().xy().unwrap().iter().collect();
        let ring = xy
            .chunks(2)
            .map(|c| crate::geometry::Position::new(c[0], c[1]))
            .collect();
        assert!(Geometry::Polygon(vec![ring]).is_valid());
    }

    #[test]
    fn polygon_is_promoted_for_multipolygon_header() {
        let schema = FeatureSchema::feature_type("parcels").with_properties([
            FeatureSchema::new("area", SchemaType::Geometry)
                .with_geometry_type(GeometryType::MultiPolygon)
                .with_role(Role::PrimaryGeometry),
        ]);
        let context = EncodingContext::new("parcels", Arc::new(schema));
        let features = [FeatureRecord::new().with_geometry(square())];
        let (bytes, written, _) = encode(&context, Default::default(), &features);
        assert_eq!(written, 1);

        let header = decode_header(&bytes);
        assert_eq!(header.geometry_type(), flatgeobuf::GeometryType::MultiPolygon);
        let records = decode_features(&bytes);
        let feature = flatgeobuf::size_prefixed_root_as_feature(records[0]).unwrap();
        let geometry = feature.geometry().unwrap();
        assert!(geometry.xy().is_none());
        let parts = geometry.parts().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts.get(0).type_(), flatgeobuf::GeometryType::Polygon);
        let xy: Vec<f64> = parts.get(0).xy().unwrap().iter().collect();
        assert_eq!(xy, [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn repaired_bowtie_keeps_both_lobes_for_multipolygon_header() {
        let schema = FeatureSchema::feature_type("parcels").with_properties([
            FeatureSchema::new("area", SchemaType::Geometry)
                .with_geometry_type(GeometryType::MultiPolygon)
                .with_role(Role::PrimaryGeometry),
        ]);
        let context = EncodingContext::new("parcels", Arc::new(schema));
        let features = [FeatureRecord::new().with_geometry(bowtie())];
        let (bytes, written, skipped) = encode(&context, Default::default(), &features);
        assert_eq!((written, skipped), (1, 0));

        let records = decode_features(&bytes);
        let feature = flatgeobuf::size_prefixed_root_as_feature(records[0]).unwrap();
        let parts = feature.geometry().unwrap().parts().unwrap();
        assert_eq!(parts.len(), 2);
        let area: f64 = parts
            .iter()
            .map(|part| {
                let xy: Vec<f64> = part.xy().unwrap().iter().collect();
                let ring: Vec<_> = xy.chunks(2).collect();
                let twice: f64 = ring
                    .windows(2)
                    .map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1])
                    .sum();
                twice.abs() / 2.0
            })
            .sum();
        assert_relative_eq!(area, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn buffer_growth_does_not_change_output() {
        let context = EncodingContext::new("buildings", Arc::new(simple_schema()));
        let features = [
            building("1", square()).with_property("name", "n".repeat(5000)),
            building("2", square()),
        ];
        let small = FlatgeobufOptions {
            initial_buffer_size: 1024,
            ..Default::default()
        };
        let large = FlatgeobufOptions {
            initial_buffer_size: 1 << 20,
            ..Default::default()
        };
        assert_eq!(
            encode(&context, small, &features).0,
            encode(&context, large, &features).0
        );
    }

    #[test]
    fn mismatched_feature_is_skipped() {
        let schema = FeatureSchema::feature_type("stations")
            .with_properties([FeatureSchema::new("level", SchemaType::Integer)]);
        let context = EncodingContext::new("stations", Arc::new(schema));
        let features = [
            FeatureRecord::new().with_id("a").with_property("level", 1),
            FeatureRecord::new().with_id("b").with_property("level", "high"),
            FeatureRecord::new().with_id("c").with_property("level", 3),
        ];
        let (bytes, written, skipped) = encode(&context, Default::default(), &features);
        assert_eq!((written, skipped), (2, 1));

        let records = decode_features(&bytes);
        assert_eq!(records.len(), 2);
        let last = flatgeobuf::size_prefixed_root_as_feature(records[1]).unwrap();
        let properties = last.properties().unwrap().bytes();
        assert_eq!(properties, [0, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn features_before_start_are_rejected() {
        let context = EncodingContext::new("buildings", Arc::new(simple_schema()));
        let mut encoder = FlatgeobufEncoder::new(&context, Vec::<u8>::new());
        let err = encoder.on_feature(&building("1", square())).unwrap_err();
        assert!(matches!(err, EncodingError::State(_)));
    }
}
