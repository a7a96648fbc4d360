//! Grid specifications for aligned raster layers.

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing geotransform coefficients.
const TRANSFORM_EPSILON: f64 = 1e-6;

/// Affine transform from pixel to projected coordinates (north-up only).
///
/// Matches the GDAL geotransform layout without the rotation terms:
/// `x = origin_x + col * pixel_width`, `y = origin_y + row * pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Coordinates of the upper-left corner of a cell.
    pub fn cell_origin(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.pixel_width,
            self.origin_y + row as f64 * self.pixel_height,
        )
    }

    /// Equality within [`TRANSFORM_EPSILON`] on every coefficient.
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        (self.origin_x - other.origin_x).abs() < TRANSFORM_EPSILON
            && (self.origin_y - other.origin_y).abs() < TRANSFORM_EPSILON
            && (self.pixel_width - other.pixel_width).abs() < TRANSFORM_EPSILON
            && (self.pixel_height - other.pixel_height).abs() < TRANSFORM_EPSILON
    }

    /// Serialize as the six GDAL coefficients.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Build from the six GDAL coefficients, ignoring rotation terms.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[0], gt[3], gt[1], gt[5])
    }
}

/// Grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
}

impl GridShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for GridShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Spatial description of one raster layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub shape: GridShape,
    /// Absent for rasters without georeferencing (synthetic test data).
    pub transform: Option<GeoTransform>,
    /// CRS identifier such as "EPSG:5070".
    pub crs: Option<String>,
    /// Embedded no-data value, if the source declares one.
    pub nodata: Option<f64>,
}

impl GridSpec {
    /// Ungeoreferenced grid of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            shape: GridShape::new(width, height),
            transform: None,
            crs: None,
            nodata: None,
        }
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn cell_count(&self) -> usize {
        self.shape.cell_count()
    }

    /// Describe why `other` is not congruent with this grid, if it is not.
    ///
    /// Shapes must match exactly. Transform and CRS are compared only when
    /// both grids carry them.
    pub fn congruence_mismatch(&self, other: &GridSpec) -> Option<String> {
        if self.shape != other.shape {
            return Some(format!("shape {} != {}", self.shape, other.shape));
        }

        if let (Some(a), Some(b)) = (&self.transform, &other.transform) {
            if !a.approx_eq(b) {
                return Some(format!("geotransform {:?} != {:?}", a.to_gdal(), b.to_gdal()));
            }
        }

        if let (Some(a), Some(b)) = (&self.crs, &other.crs) {
            if !a.eq_ignore_ascii_case(b) {
                return Some(format!("crs {} != {}", a, b));
            }
        }

        None
    }

    /// True when both grids describe the same cells.
    pub fn is_congruent(&self, other: &GridSpec) -> bool {
        self.congruence_mismatch(other).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn albers_30m() -> GeoTransform {
        GeoTransform::new(-2294730.0, 2906130.0, 30.0, -30.0)
    }

    #[test]
    fn test_congruent_grids() {
        let a = GridSpec::new(4, 4).with_transform(albers_30m()).with_crs("EPSG:5070");
        let b = GridSpec::new(4, 4).with_transform(albers_30m()).with_crs("epsg:5070");
        assert!(a.is_congruent(&b));
    }

    #[test]
    fn test_shape_mismatch_reported() {
        let a = GridSpec::new(4, 4);
        let b = GridSpec::new(4, 5);
        let msg = a.congruence_mismatch(&b).unwrap();
        assert!(msg.contains("4x4"));
        assert!(msg.contains("4x5"));
    }

    #[test]
    fn test_transform_mismatch_reported() {
        let a = GridSpec::new(4, 4).with_transform(albers_30m());
        let shifted = GeoTransform::new(-2294700.0, 2906130.0, 30.0, -30.0);
        let b = GridSpec::new(4, 4).with_transform(shifted);
        assert!(!a.is_congruent(&b));
    }

    #[test]
    fn test_missing_transform_is_not_compared() {
        let a = GridSpec::new(4, 4).with_transform(albers_30m());
        let b = GridSpec::new(4, 4);
        assert!(a.is_congruent(&b));
    }

    #[test]
    fn test_gdal_roundtrip() {
        let gt = albers_30m();
        assert_eq!(GeoTransform::from_gdal(gt.to_gdal()), gt);
        assert_eq!(gt.cell_origin(2, 1), (-2294670.0, 2906100.0));
    }
}
