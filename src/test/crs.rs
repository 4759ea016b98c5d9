use crate::crs::{CrsTransformer, EpsgCrs};
use crate::error::Result;

/// Shifts x and y by a fixed offset, reporting CRS84 to EPSG:3857.
#[derive(Debug)]
pub(crate) struct OffsetTransformer {
    dx: f64,
    dy: f64,
    source: EpsgCrs,
    target: EpsgCrs,
}

impl OffsetTransformer {
    pub(crate) fn new(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            source: EpsgCrs::crs84(),
            target: EpsgCrs::new(3857),
        }
    }
}

impl CrsTransformer for OffsetTransformer {
    fn source_crs(&self) -> &EpsgCrs {
        &self.source
    }

    fn target_crs(&self) -> &EpsgCrs {
        &self.target
    }

    fn transform(&self, coordinate: &mut [f64]) -> Result<()> {
        coordinate[0] += self.dx;
        coordinate[1] += self.dy;
        Ok(())
    }
}
