//! Validity checks and repair through the `geo` algorithms.
//!
//! Repaired geometries are two-dimensional; z values do not survive the overlay.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Coord, Line, LineString, MultiPolygon, Polygon, Validation};
use log::{debug, warn};

use crate::error::{EncodingError, Result};
use crate::geometry::{Geometry, Position, Ring};
use crate::schema::GeometryType;

fn to_coord(position: &Position) -> Coord {
    Coord {
        x: position.x,
        y: position.y,
    }
}

fn to_line_string(positions: &[Position]) -> LineString {
    LineString::new(positions.iter().map(to_coord).collect())
}

fn to_polygon(rings: &[Ring]) -> Polygon {
    let mut rings = rings.iter();
    let exterior = rings
        .next()
        .map(|ring| to_line_string(ring))
        .unwrap_or_else(|| LineString::new(vec![]));
    Polygon::new(exterior, rings.map(|ring| to_line_string(ring)).collect())
}

fn from_line_string(line: &LineString) -> Vec<Position> {
    line.coords().map(|c| Position::new(c.x, c.y)).collect()
}

fn from_polygon(polygon: &Polygon) -> Vec<Ring> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(from_line_string)
        .collect()
}

impl From<&Geometry> for geo::Geometry {
    fn from(value: &Geometry) -> Self {
        match value {
            Geometry::Point(position) => geo::Geometry::Point(to_coord(position).into()),
            Geometry::MultiPoint(positions) => geo::Geometry::MultiPoint(
                positions
                    .iter()
                    .map(|p| geo::Point::from(to_coord(p)))
                    .collect(),
            ),
            Geometry::LineString(positions) => {
                geo::Geometry::LineString(to_line_string(positions))
            }
            Geometry::MultiLineString(lines) => geo::Geometry::MultiLineString(
                geo::MultiLineString::new(lines.iter().map(|l| to_line_string(l)).collect()),
            ),
            Geometry::Polygon(rings) => geo::Geometry::Polygon(to_polygon(rings)),
            Geometry::MultiPolygon(polygons) => geo::Geometry::MultiPolygon(MultiPolygon::new(
                polygons.iter().map(|rings| to_polygon(rings)).collect(),
            )),
            Geometry::GeometryCollection(members) => geo::Geometry::GeometryCollection(
                geo::GeometryCollection(members.iter().map(geo::Geometry::from).collect()),
            ),
        }
    }
}

impl Geometry {
    /// Returns `true` if the geometry is valid in the OGC simple features sense.
    pub fn is_valid(&self) -> bool {
        geo::Geometry::from(self).is_valid()
    }
}

fn distance_squared(a: Coord, b: Coord) -> f64 {
    let d = a - b;
    d.x * d.x + d.y * d.y
}

/// Vertices of a closed ring with every self-intersection inserted as a vertex.
fn node_ring(ring: &LineString) -> Vec<Coord> {
    let lines: Vec<Line> = ring.lines().filter(|l| l.start != l.end).collect();
    let mut splits: Vec<Vec<Coord>> = vec![vec![]; lines.len()];
    for i in 0..lines.len() {
        for j in i + 1..lines.len() {
            // computed once per pair so both edges receive the identical vertex
            match line_intersection(lines[i], lines[j]) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    splits[i].push(intersection);
                    splits[j].push(intersection);
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    for c in [intersection.start, intersection.end] {
                        splits[i].push(c);
                        splits[j].push(c);
                    }
                }
                None => {}
            }
        }
    }

    let mut noded = Vec::with_capacity(lines.len() * 2 + 1);
    for (line, mut points) in lines.iter().zip(splits) {
        points.retain(|c| *c != line.start && *c != line.end);
        points.sort_by(|a, b| {
            distance_squared(line.start, *a).total_cmp(&distance_squared(line.start, *b))
        });
        points.dedup();
        noded.push(line.start);
        noded.extend(points);
    }
    if let Some(first) = noded.first().copied() {
        noded.push(first);
    }
    noded
}

/// Split a noded ring into simple closed loops, cutting at every repeated vertex.
fn simple_loops(noded: &[Coord]) -> Vec<LineString> {
    let mut loops = vec![];
    let mut stack: Vec<Coord> = vec![];
    for &coord in noded {
        match stack.iter().position(|c| *c == coord) {
            Some(k) => {
                let mut ring = stack.split_off(k);
                ring.push(coord);
                stack.push(coord);
                if ring.len() >= 4 {
                    loops.push(LineString::new(ring));
                }
            }
            None => stack.push(coord),
        }
    }
    loops
}

/// Simple, counter-clockwise polygons covering the area enclosed by `ring`.
fn simple_polygons(ring: &LineString) -> Vec<Polygon> {
    simple_loops(&node_ring(ring))
        .into_iter()
        .map(|ring| Polygon::new(ring, vec![]).orient(Direction::Default))
        .filter(|polygon| polygon.unsigned_area() > 0.0)
        .collect()
}

/// Resolve self-intersections and ring problems of a polygonal geometry.
///
/// Rings are split into simple loops before the overlay, so every lobe of a
/// self-intersecting ring keeps its area regardless of its winding.
fn repair_polygonal(polygons: &[Polygon]) -> MultiPolygon {
    let mut shells = vec![];
    let mut holes = vec![];
    for polygon in polygons {
        shells.extend(simple_polygons(polygon.exterior()));
        for interior in polygon.interiors() {
            holes.extend(simple_polygons(interior));
        }
    }
    let shell = geo::unary_union(&shells);
    if holes.is_empty() {
        shell
    } else {
        shell.difference(&geo::unary_union(&holes))
    }
}

fn into_geometry(repaired: MultiPolygon, target: GeometryType) -> Result<Geometry> {
    let mut polygons = repaired.0;
    match polygons.len() {
        0 => Err(EncodingError::GeometryRepair(
            "repair produced an empty geometry".to_string(),
        )),
        1 => Ok(Geometry::Polygon(from_polygon(&polygons[0]))),
        n if target == GeometryType::Polygon => {
            // A single-polygon container cannot hold the split result, keep the dominant part.
            polygons.sort_by(|a, b| b.unsigned_area().total_cmp(&a.unsigned_area()));
            warn!("repaired polygon split into {n} parts, keeping the largest");
            Ok(Geometry::Polygon(from_polygon(&polygons[0])))
        }
        _ => Ok(Geometry::MultiPolygon(
            polygons.iter().map(from_polygon).collect(),
        )),
    }
}

/// Repair an invalid geometry so it can be written to a container declaring `target`.
///
/// Only polygonal geometries (and collections of them) can be repaired. Valid input is
/// returned unchanged.
pub fn repair(geometry: &Geometry, target: GeometryType) -> Result<Geometry> {
    if geometry.is_valid() {
        return Ok(geometry.clone());
    }
    debug!("repairing invalid {geometry}");

    match geometry {
        Geometry::Polygon(rings) => into_geometry(repair_polygonal(&[to_polygon(rings)]), target),
        Geometry::MultiPolygon(polygons) => {
            let polygons: Vec<Polygon> = polygons.iter().map(|rings| to_polygon(rings)).collect();
            into_geometry(repair_polygonal(&polygons), target)
        }
        Geometry::GeometryCollection(members) => Ok(Geometry::GeometryCollection(
            members
                .iter()
                .map(|member| repair(member, GeometryType::Any))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Err(EncodingError::InvalidGeometry(format!(
            "{other} is invalid and cannot be repaired"
        ))),
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;
    use crate::test::geometry::{bowtie, square};

    #[test]
    fn valid_polygon_is_untouched() {
        assert!(square().is_valid());
        assert_eq!(repair(&square(), GeometryType::Polygon).unwrap(), square());
    }

    #[test]
    fn bowtie_is_repaired_into_polygon() {
        assert!(!bowtie().is_valid());
        let repaired = repair(&bowtie(), GeometryType::Polygon).unwrap();
        assert_eq!(repaired.geometry_type(), GeometryType::Polygon);
        assert!(repaired.is_valid());
        // one of the two triangles meeting at (5, 5)
        assert_relative_eq!(geo::Geometry::from(&repaired).unsigned_area(), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn bowtie_keeps_both_parts_for_aggregate_target() {
        let repaired = repair(&bowtie(), GeometryType::MultiPolygon).unwrap();
        assert!(repaired.is_valid());
        assert_relative_eq!(geo::Geometry::from(&repaired).unsigned_area(), 50.0, epsilon = 1e-9);
        match repaired {
            Geometry::MultiPolygon(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected MultiPolygon, got {other}"),
        }
    }

    #[test]
    fn self_intersecting_ring_with_hole_keeps_area() {
        // figure eight with a hole in its right lobe
        let rings = vec![
            vec![
                Position::new(0., 0.),
                Position::new(20., 10.),
                Position::new(20., 0.),
                Position::new(0., 10.),
                Position::new(0., 0.),
            ],
            vec![
                Position::new(16., 4.),
                Position::new(18., 4.),
                Position::new(18., 6.),
                Position::new(16., 6.),
                Position::new(16., 4.),
            ],
        ];
        let repaired = repair(&Geometry::Polygon(rings), GeometryType::Any).unwrap();
        assert!(repaired.is_valid());
        // two triangles of 50 minus a hole of 4
        assert_relative_eq!(geo::Geometry::from(&repaired).unsigned_area(), 96.0, epsilon = 1e-9);
    }

    #[test]
    fn noding_splits_crossing_edges() {
        let ring = match geo::Geometry::from(&bowtie()) {
            geo::Geometry::Polygon(polygon) => polygon.exterior().clone(),
            _ => unreachable!(),
        };
        let loops = simple_loops(&node_ring(&ring));
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().all(|l| l.0.contains(&Coord { x: 5., y: 5. })));
    }

    #[test]
    fn invalid_line_cannot_be_repaired() {
        let line = Geometry::LineString(vec![Position::new(f64::NAN, 0.0), Position::new(1.0, 1.0)]);
        let err = repair(&line, GeometryType::LineString).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidGeometry(_)));
    }
}
