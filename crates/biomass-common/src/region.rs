//! Analysis regions.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::grid::{GeoTransform, GridSpec};

/// A named analysis extent with its target grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Lower-case name used in file names ("oregon").
    pub name: String,
    /// Extent in the region's CRS, aligned to `resolution`.
    pub bbox: BoundingBox,
    /// Cell size in CRS units.
    pub resolution: f64,
    /// Target CRS, e.g. "EPSG:5070".
    pub crs: String,
}

impl Region {
    pub fn new(
        name: impl Into<String>,
        bbox: BoundingBox,
        resolution: f64,
        crs: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bbox,
            resolution,
            crs: crs.into(),
        }
    }

    /// Default Oregon extent (EPSG:5070, 30 m).
    pub fn oregon() -> Self {
        Self::new(
            "oregon",
            BoundingBox::new(-2294730.0, 2301450.0, -1584300.0, 2906130.0),
            30.0,
            "EPSG:5070",
        )
    }

    /// Default Washington extent (EPSG:5070, 30 m).
    pub fn washington() -> Self {
        Self::new(
            "washington",
            BoundingBox::new(-2137770.0, 2734170.0, -1545540.0, 3172590.0),
            30.0,
            "EPSG:5070",
        )
    }

    /// Grid every layer clipped to this region shares: north-up, origin at
    /// the top-left corner of the extent.
    pub fn grid_spec(&self) -> GridSpec {
        let (width, height) = self.bbox.grid_dimensions(self.resolution);
        GridSpec::new(width, height)
            .with_transform(GeoTransform::new(
                self.bbox.min_x,
                self.bbox.max_y,
                self.resolution,
                -self.resolution,
            ))
            .with_crs(self.crs.clone())
    }
}
