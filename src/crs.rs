//! Coordinate reference systems and the transformer seam used by the encoders.
//!
//! Reprojection itself is performed by an external collaborator implementing
//! [`CrsTransformer`]; this crate only consumes it.

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{Geometry, Position};

/// Axis order of a CRS as used on the wire.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AxisOrder {
    /// Longitude/easting first, regardless of the authority definition.
    #[default]
    LonLat,

    /// Axis order as defined by the authority (latitude first for EPSG:4326).
    LatLon,
}

/// A CRS identified by its EPSG code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EpsgCrs {
    code: i32,

    #[serde(default)]
    axis_order: AxisOrder,
}

impl EpsgCrs {
    /// Construct from an EPSG code with longitude-first axis order.
    pub fn new(code: i32) -> Self {
        Self {
            code,
            axis_order: AxisOrder::LonLat,
        }
    }

    /// Construct from an EPSG code with an explicit axis order.
    pub fn with_axis_order(code: i32, axis_order: AxisOrder) -> Self {
        Self { code, axis_order }
    }

    /// WGS 84 in longitude/latitude order (OGC CRS84).
    pub fn crs84() -> Self {
        Self::new(4326)
    }

    /// The numeric EPSG code.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn axis_order(&self) -> AxisOrder {
        self.axis_order
    }

    /// `http://www.opengis.net/def/crs/...` form used in `srsName` attributes.
    ///
    /// WGS 84 in longitude/latitude order is rendered as OGC CRS84.
    pub fn to_uri_string(&self) -> String {
        if self.code == 4326 && self.axis_order == AxisOrder::LonLat {
            "http://www.opengis.net/def/crs/OGC/1.3/CRS84".to_string()
        } else {
            format!("http://www.opengis.net/def/crs/EPSG/0/{}", self.code)
        }
    }

    /// `urn:ogc:def:crs:EPSG::<code>` form.
    pub fn to_urn_string(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.code)
    }
}

impl Default for EpsgCrs {
    fn default() -> Self {
        Self::crs84()
    }
}

impl Display for EpsgCrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

/// Reprojects coordinate tuples from a source to a target CRS.
///
/// Implementations must be usable from any request thread; a single transformer is typically
/// shared by all requests targeting the same CRS pair.
pub trait CrsTransformer: Debug + Send + Sync {
    fn source_crs(&self) -> &EpsgCrs;

    fn target_crs(&self) -> &EpsgCrs;

    /// Transform one coordinate tuple in place.
    ///
    /// `coordinate` holds x, y and, for 3D input, z.
    fn transform(&self, coordinate: &mut [f64]) -> Result<()>;

    /// Fixed output dimension, if the target CRS mandates one.
    fn target_dimension(&self) -> Option<usize> {
        None
    }

    /// Transform every position of a geometry.
    fn transform_geometry(&self, geometry: &Geometry) -> Result<Geometry> {
        geometry.try_map_positions(&mut |position: Position| {
            let mut tuple = [position.x, position.y, position.z.unwrap_or(0.0)];
            let dimension = if position.z.is_some() { 3 } else { 2 };
            self.transform(&mut tuple[..dimension])?;
            Ok(Position {
                x: tuple[0],
                y: tuple[1],
                z: position.z.map(|_| tuple[2]),
            })
        })
    }
}

/// A transformer that leaves coordinates untouched.
#[derive(Debug, Clone)]
pub struct IdentityTransformer {
    crs: EpsgCrs,
}

impl IdentityTransformer {
    pub fn new(crs: EpsgCrs) -> Self {
        Self { crs }
    }
}

impl CrsTransformer for IdentityTransformer {
    fn source_crs(&self) -> &EpsgCrs {
        &self.crs
    }

    fn target_crs(&self) -> &EpsgCrs {
        &self.crs
    }

    fn transform(&self, _coordinate: &mut [f64]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::crs::OffsetTransformer;

    #[test]
    fn crs_renderings() {
        let crs = EpsgCrs::new(25832);
        assert_eq!(crs.code(), 25832);
        assert_eq!(
            crs.to_uri_string(),
            "http://www.opengis.net/def/crs/EPSG/0/25832"
        );
        assert_eq!(crs.to_urn_string(), "urn:ogc:def:crs:EPSG::25832");
        assert_eq!(crs.to_string(), "EPSG:25832");
    }

    #[test]
    fn crs84_uri() {
        assert_eq!(
            EpsgCrs::crs84().to_uri_string(),
            "http://www.opengis.net/def/crs/OGC/1.3/CRS84"
        );
        assert_eq!(
            EpsgCrs::with_axis_order(4326, AxisOrder::LatLon).to_uri_string(),
            "http://www.opengis.net/def/crs/EPSG/0/4326"
        );
    }

    #[test]
    fn crs_from_config() {
        let crs: EpsgCrs = serde_json::from_str(r#"{"code": 3857}"#).unwrap();
        assert_eq!(crs, EpsgCrs::new(3857));
    }

    #[test]
    fn transform_geometry_keeps_z() {
        let transformer = OffsetTransformer::new(10.0, 20.0);
        let geometry = Geometry::LineString(vec![
            Position::new(1.0, 2.0),
            Position::new_3d(3.0, 4.0, 5.0),
        ]);
        let transformed = transformer.transform_geometry(&geometry).unwrap();
        assert_eq!(
            transformed,
            Geometry::LineString(vec![
                Position::new(11.0, 22.0),
                Position::new_3d(13.0, 24.0, 5.0),
            ])
        );
    }
}
