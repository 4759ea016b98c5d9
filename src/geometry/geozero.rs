use geozero::{GeomProcessor, GeozeroGeometry};

use crate::geometry::{Geometry, Position};

fn process_position<P: GeomProcessor>(
    position: &Position,
    idx: usize,
    processor: &mut P,
) -> geozero::error::Result<()> {
    if processor.dimensions().z {
        processor.coordinate(position.x, position.y, position.z, None, None, None, idx)
    } else {
        processor.xy(position.x, position.y, idx)
    }
}

fn process_line<P: GeomProcessor>(
    positions: &[Position],
    tagged: bool,
    idx: usize,
    processor: &mut P,
) -> geozero::error::Result<()> {
    processor.linestring_begin(tagged, positions.len(), idx)?;
    for (coord_idx, position) in positions.iter().enumerate() {
        process_position(position, coord_idx, processor)?;
    }
    processor.linestring_end(tagged, idx)
}

fn process_polygon<P: GeomProcessor>(
    rings: &[Vec<Position>],
    tagged: bool,
    idx: usize,
    processor: &mut P,
) -> geozero::error::Result<()> {
    processor.polygon_begin(tagged, rings.len(), idx)?;
    for (ring_idx, ring) in rings.iter().enumerate() {
        process_line(ring, false, ring_idx, processor)?;
    }
    processor.polygon_end(tagged, idx)
}

pub(crate) fn process_geometry<P: GeomProcessor>(
    geometry: &Geometry,
    idx: usize,
    processor: &mut P,
) -> geozero::error::Result<()> {
    match geometry {
        Geometry::Point(position) => {
            processor.point_begin(idx)?;
            process_position(position, 0, processor)?;
            processor.point_end(idx)
        }
        Geometry::MultiPoint(positions) => {
            processor.multipoint_begin(positions.len(), idx)?;
            for (point_idx, position) in positions.iter().enumerate() {
                process_position(position, point_idx, processor)?;
            }
            processor.multipoint_end(idx)
        }
        Geometry::LineString(positions) => process_line(positions, true, idx, processor),
        Geometry::MultiLineString(lines) => {
            processor.multilinestring_begin(lines.len(), idx)?;
            for (line_idx, line) in lines.iter().enumerate() {
                process_line(line, false, line_idx, processor)?;
            }
            processor.multilinestring_end(idx)
        }
        Geometry::Polygon(rings) => process_polygon(rings, true, idx, processor),
        Geometry::MultiPolygon(polygons) => {
            processor.multipolygon_begin(polygons.len(), idx)?;
            for (polygon_idx, rings) in polygons.iter().enumerate() {
                process_polygon(rings, false, polygon_idx, processor)?;
            }
            processor.multipolygon_end(idx)
        }
        Geometry::GeometryCollection(members) => {
            processor.geometrycollection_begin(members.len(), idx)?;
            for (member_idx, member) in members.iter().enumerate() {
                process_geometry(member, member_idx, processor)?;
            }
            processor.geometrycollection_end(idx)
        }
    }
}

impl GeozeroGeometry for Geometry {
    fn process_geom<P: GeomProcessor>(&self, processor: &mut P) -> geozero::error::Result<()>
    where
        Self: Sized,
    {
        process_geometry(self, 0, processor)
    }
}

#[cfg(test)]
mod test {
    use geozero::error::Result;

    use super::*;
    use crate::test::geometry::{bowtie, square};

    /// Records the processor callbacks as a compact trace.
    #[derive(Default)]
    struct Trace(Vec<String>);

    impl GeomProcessor for Trace {
        fn xy(&mut self, x: f64, y: f64, _idx: usize) -> Result<()> {
            self.0.push(format!("{x} {y}"));
            Ok(())
        }
        fn polygon_begin(&mut self, tagged: bool, size: usize, _idx: usize) -> Result<()> {
            self.0.push(format!("polygon({tagged},{size})"));
            Ok(())
        }
        fn linestring_begin(&mut self, tagged: bool, size: usize, _idx: usize) -> Result<()> {
            self.0.push(format!("line({tagged},{size})"));
            Ok(())
        }
        fn multipolygon_begin(&mut self, size: usize, _idx: usize) -> Result<()> {
            self.0.push(format!("multipolygon({size})"));
            Ok(())
        }
    }

    #[test]
    fn polygon_events() {
        let mut trace = Trace::default();
        square().process_geom(&mut trace).unwrap();
        assert_eq!(trace.0[0], "polygon(true,1)");
        assert_eq!(trace.0[1], "line(false,5)");
        assert_eq!(trace.0[2], "0 0");
        assert_eq!(trace.0.len(), 7);
    }

    #[test]
    fn multipolygon_parts_are_untagged() {
        let mut trace = Trace::default();
        let geometry = Geometry::MultiPolygon(vec![
            match square() {
                Geometry::Polygon(rings) => rings,
                _ => unreachable!(),
            },
            match bowtie() {
                Geometry::Polygon(rings) => rings,
                _ => unreachable!(),
            },
        ]);
        geometry.process_geom(&mut trace).unwrap();
        assert_eq!(trace.0[0], "multipolygon(2)");
        assert_eq!(trace.0[1], "polygon(false,1)");
    }
}
