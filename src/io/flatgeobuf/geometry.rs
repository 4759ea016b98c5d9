//! Serialization of geometries into FlatGeobuf geometry tables.

use flatbuffers::{FlatBufferBuilder, WIPOffset};
use flatgeobuf::GeometryArgs;
use geozero::error::{GeozeroError, Result as GeozeroResult};
use geozero::{CoordDimensions, GeomProcessor};

use crate::io::flatgeobuf::header::fgb_geometry_type;
use crate::schema::GeometryType;

/// One geometry table: flat coordinate arrays plus nested parts for aggregates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GeometryPart {
    geometry_type: GeometryType,
    xy: Vec<f64>,
    z: Vec<f64>,
    ends: Vec<u32>,
    parts: Vec<GeometryPart>,
}

impl GeometryPart {
    fn new(geometry_type: GeometryType) -> Self {
        Self {
            geometry_type,
            xy: vec![],
            z: vec![],
            ends: vec![],
            parts: vec![],
        }
    }

    /// Write this part and its children, returning the offset of the table.
    ///
    /// The type is only written when `with_type` is set; readers take it from the header
    /// otherwise.
    pub(crate) fn build<'fbb>(
        &self,
        builder: &mut FlatBufferBuilder<'fbb>,
        with_type: bool,
    ) -> WIPOffset<flatgeobuf::Geometry<'fbb>> {
        let parts: Vec<_> = self
            .parts
            .iter()
            .map(|part| part.build(builder, true))
            .collect();
        let parts = (!parts.is_empty()).then(|| builder.create_vector(&parts));
        // a single ring or line needs no ends
        let ends = (self.ends.len() > 1).then(|| builder.create_vector(&self.ends));
        let xy = (!self.xy.is_empty()).then(|| builder.create_vector(&self.xy));
        let z = (!self.z.is_empty()).then(|| builder.create_vector(&self.z));
        let type_ = if with_type {
            fgb_geometry_type(self.geometry_type)
        } else {
            flatgeobuf::GeometryType::Unknown
        };

        flatgeobuf::Geometry::create(
            builder,
            &GeometryArgs {
                ends,
                xy,
                z,
                type_,
                parts,
                ..Default::default()
            },
        )
    }
}

/// End index of a ring or line holding `coordinates` positions in total.
fn ring_end(coordinates: usize) -> GeozeroResult<u32> {
    u32::try_from(coordinates).map_err(|_| {
        GeozeroError::Geometry(format!(
            "{coordinates} coordinates exceed the ring end index range"
        ))
    })
}

/// A geozero processor collecting a geometry into [`GeometryPart`]s.
#[derive(Debug)]
pub(crate) struct GeometryWriter {
    has_z: bool,
    stack: Vec<GeometryPart>,
    root: Option<GeometryPart>,
}

impl GeometryWriter {
    pub(crate) fn new(has_z: bool) -> Self {
        Self {
            has_z,
            stack: vec![],
            root: None,
        }
    }

    pub(crate) fn finish(self) -> GeozeroResult<GeometryPart> {
        self.root
            .ok_or_else(|| GeozeroError::Geometry("no geometry was processed".to_string()))
    }

    fn current(&mut self) -> GeozeroResult<&mut GeometryPart> {
        self.stack
            .last_mut()
            .ok_or_else(|| GeozeroError::Geometry("coordinate outside of a geometry".to_string()))
    }

    fn begin(&mut self, geometry_type: GeometryType) -> GeozeroResult<()> {
        self.stack.push(GeometryPart::new(geometry_type));
        Ok(())
    }

    fn end(&mut self) -> GeozeroResult<()> {
        let part = self
            .stack
            .pop()
            .ok_or_else(|| GeozeroError::Geometry("unbalanced geometry end".to_string()))?;
        match self.stack.last_mut() {
            Some(parent) => parent.parts.push(part),
            None => self.root = Some(part),
        }
        Ok(())
    }

    fn end_of_line(&mut self) -> GeozeroResult<()> {
        let part = self.current()?;
        let end = ring_end(part.xy.len() / 2)?;
        part.ends.push(end);
        Ok(())
    }
}

impl GeomProcessor for GeometryWriter {
    fn dimensions(&self) -> CoordDimensions {
        if self.has_z {
            CoordDimensions::xyz()
        } else {
            CoordDimensions::xy()
        }
    }

    fn xy(&mut self, x: f64, y: f64, _idx: usize) -> GeozeroResult<()> {
        let part = self.current()?;
        part.xy.extend([x, y]);
        Ok(())
    }

    fn coordinate(
        &mut self,
        x: f64,
        y: f64,
        z: Option<f64>,
        _m: Option<f64>,
        _t: Option<f64>,
        _tm: Option<u64>,
        _idx: usize,
    ) -> GeozeroResult<()> {
        let has_z = self.has_z;
        let part = self.current()?;
        part.xy.extend([x, y]);
        if has_z {
            part.z.push(z.unwrap_or(0.0));
        }
        Ok(())
    }

    fn point_begin(&mut self, _idx: usize) -> GeozeroResult<()> {
        self.begin(GeometryType::Point)
    }

    fn point_end(&mut self, _idx: usize) -> GeozeroResult<()> {
        self.end()
    }

    fn multipoint_begin(&mut self, _size: usize, _idx: usize) -> GeozeroResult<()> {
        self.begin(GeometryType::MultiPoint)
    }

    fn multipoint_end(&mut self, _idx: usize) -> GeozeroResult<()> {
        self.end()
    }

    fn linestring_begin(&mut self, tagged: bool, _size: usize, _idx: usize) -> GeozeroResult<()> {
        if tagged {
            self.begin(GeometryType::LineString)
        } else {
            Ok(())
        }
    }

    fn linestring_end(&mut self, tagged: bool, _idx: usize) -> GeozeroResult<()> {
        if tagged {
            self.end()
        } else {
            self.end_of_line()
        }
    }

    fn multilinestring_begin(&mut self, _size: usize, _idx: usize) -> GeozeroResult<()> {
        self.begin(GeometryType::MultiLineString)
    }

    fn multilinestring_end(&mut self, _idx: usize) -> GeozeroResult<()> {
        self.end()
    }

    fn polygon_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> GeozeroResult<()> {
        self.begin(GeometryType::Polygon)
    }

    fn polygon_end(&mut self, _tagged: bool, _idx: usize) -> GeozeroResult<()> {
        self.end()
    }

    fn multipolygon_begin(&mut self, _size: usize, _idx: usize) -> GeozeroResult<()> {
        self.begin(GeometryType::MultiPolygon)
    }

    fn multipolygon_end(&mut self, _idx: usize) -> GeozeroResult<()> {
        self.end()
    }

    fn geometrycollection_begin(&mut self, _size: usize, _idx: usize) -> GeozeroResult<()> {
        self.begin(GeometryType::GeometryCollection)
    }

    fn geometrycollection_end(&mut self, _idx: usize) -> GeozeroResult<()> {
        self.end()
    }
}
