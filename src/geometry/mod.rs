//! Engine-neutral geometry representation handed to the encoders.
//!
//! Coordinates are stored in the CRS selected upstream; the encoders never reproject a
//! [`Geometry`] on their own.

mod geozero;
mod validity;

pub use validity::repair;

use std::fmt::Display;

use crate::error::{EncodingError, Result};
use crate::schema::GeometryType;

/// A single coordinate tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Ordered positions of a polygon ring, first ring is the exterior.
pub type Ring = Vec<Position>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// The concrete type of this geometry.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    /// Returns `true` if any position carries a z value.
    pub fn has_z(&self) -> bool {
        let mut has_z = false;
        self.for_each_position(&mut |position: &Position| has_z |= position.z.is_some());
        has_z
    }

    pub fn num_positions(&self) -> usize {
        let mut count = 0;
        self.for_each_position(&mut |_: &Position| count += 1);
        count
    }

    fn for_each_position<F: FnMut(&Position)>(&self, f: &mut F) {
        match self {
            Geometry::Point(position) => f(position),
            Geometry::MultiPoint(positions) | Geometry::LineString(positions) => {
                positions.iter().for_each(|p| f(p))
            }
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().for_each(|p| f(p))
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().for_each(|p| f(p))
            }
            Geometry::GeometryCollection(members) => {
                members.iter().for_each(|member| member.for_each_position(f))
            }
        }
    }

    /// Build a new geometry of the same shape with every position passed through `f`.
    pub fn try_map_positions<F>(&self, f: &mut F) -> Result<Geometry>
    where
        F: FnMut(Position) -> Result<Position>,
    {
        fn map_all<F>(positions: &[Position], f: &mut F) -> Result<Vec<Position>>
        where
            F: FnMut(Position) -> Result<Position>,
        {
            positions.iter().map(|p| f(*p)).collect()
        }

        let mapped = match self {
            Geometry::Point(position) => Geometry::Point(f(*position)?),
            Geometry::MultiPoint(positions) => Geometry::MultiPoint(map_all(positions, f)?),
            Geometry::LineString(positions) => Geometry::LineString(map_all(positions, f)?),
            Geometry::MultiLineString(lines) => Geometry::MultiLineString(
                lines
                    .iter()
                    .map(|line| map_all(line, f))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings
                    .iter()
                    .map(|ring| map_all(ring, f))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| {
                        rings
                            .iter()
                            .map(|ring| map_all(ring, f))
                            .collect::<Result<Vec<Ring>>>()
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Geometry::GeometryCollection(members) => Geometry::GeometryCollection(
                members
                    .iter()
                    .map(|member| member.try_map_positions(f))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        Ok(mapped)
    }

    /// Coerce this geometry into `target`, the single geometry type a container declares.
    ///
    /// Single primitives are promoted into a one-element aggregate, and single-part
    /// aggregates are unwrapped when the target is the primitive type. Any other mismatch
    /// is an [`EncodingError::IncorrectGeometryType`].
    pub fn coerce_to(self, target: GeometryType) -> Result<Geometry> {
        if target == GeometryType::Any || self.geometry_type() == target {
            return Ok(self);
        }

        let coerced = match (target, self) {
            (GeometryType::MultiPoint, Geometry::Point(point)) => {
                Geometry::MultiPoint(vec![point])
            }
            (GeometryType::MultiLineString, Geometry::LineString(line)) => {
                Geometry::MultiLineString(vec![line])
            }
            (GeometryType::MultiPolygon, Geometry::Polygon(rings)) => {
                Geometry::MultiPolygon(vec![rings])
            }
            (GeometryType::Point, Geometry::MultiPoint(points)) if points.len() == 1 => {
                Geometry::Point(points[0])
            }
            (GeometryType::LineString, Geometry::MultiLineString(mut lines))
                if lines.len() == 1 =>
            {
                Geometry::LineString(lines.remove(0))
            }
            (GeometryType::Polygon, Geometry::MultiPolygon(mut polygons))
                if polygons.len() == 1 =>
            {
                Geometry::Polygon(polygons.remove(0))
            }
            (GeometryType::GeometryCollection, geometry) => {
                Geometry::GeometryCollection(vec![geometry])
            }
            (target, geometry) => {
                return Err(EncodingError::IncorrectGeometryType(format!(
                    "cannot write {} as {}",
                    geometry.geometry_type(),
                    target
                )))
            }
        };
        Ok(coerced)
    }
}

impl Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} with {} positions",
            self.geometry_type(),
            self.num_positions()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::geometry::{square, square_3d};

    #[test]
    fn promote_polygon() {
        let promoted = square().coerce_to(GeometryType::MultiPolygon).unwrap();
        match promoted {
            Geometry::MultiPolygon(polygons) => {
                assert_eq!(polygons.len(), 1);
                assert_eq!(Geometry::Polygon(polygons[0].clone()), square());
            }
            other => panic!("expected MultiPolygon, got {other}"),
        }
    }

    #[test]
    fn promote_point_and_line() {
        let point = Geometry::Point(Position::new(1.0, 2.0));
        assert_eq!(
            point.coerce_to(GeometryType::MultiPoint).unwrap(),
            Geometry::MultiPoint(vec![Position::new(1.0, 2.0)])
        );

        let line = Geometry::LineString(vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)]);
        assert_eq!(
            line.clone()
                .coerce_to(GeometryType::MultiLineString)
                .unwrap(),
            Geometry::MultiLineString(vec![match line {
                Geometry::LineString(positions) => positions,
                _ => unreachable!(),
            }])
        );
    }

    #[test]
    fn demote_single_part() {
        let multi = Geometry::MultiPolygon(vec![match square() {
            Geometry::Polygon(rings) => rings,
            _ => unreachable!(),
        }]);
        assert_eq!(multi.coerce_to(GeometryType::Polygon).unwrap(), square());
    }

    #[test]
    fn incompatible_type_is_rejected() {
        let point = Geometry::Point(Position::new(1.0, 2.0));
        let err = point.coerce_to(GeometryType::Polygon).unwrap_err();
        assert!(matches!(err, EncodingError::IncorrectGeometryType(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn any_accepts_everything() {
        assert_eq!(square().coerce_to(GeometryType::Any).unwrap(), square());
    }

    #[test]
    fn z_detection() {
        assert!(!square().has_z());
        assert!(square_3d().has_z());
        assert_eq!(square().num_positions(), 5);
    }
}
