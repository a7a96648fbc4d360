//! Year-over-year raster differencing.

use biomass_common::GridSpec;
use rayon::prelude::*;

use crate::error::{RasterError, Result};
use crate::layer::RasterLayer;
use crate::mask;

/// No-data value of persisted difference rasters.
pub const DIFF_NODATA: i16 = i16::MIN;

/// Signed 16-bit difference between two co-registered layers.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceRaster {
    pub spec: GridSpec,
    pub values: Vec<i16>,
    pub validity: Vec<bool>,
}

impl DifferenceRaster {
    /// Difference at a scan index, `None` where either input was invalid.
    pub fn get(&self, index: usize) -> Option<i16> {
        match self.validity.get(index) {
            Some(true) => self.values.get(index).copied(),
            _ => None,
        }
    }

    /// Convert to a writable layer with [`DIFF_NODATA`] in invalid cells.
    pub fn to_layer(&self) -> RasterLayer {
        RasterLayer {
            spec: self.spec.clone(),
            values: self.values.par_iter().map(|&v| v as f32).collect(),
            validity: self.validity.clone(),
        }
    }
}

/// Compute `later - earlier` cell by cell.
///
/// The first argument is always treated as the earlier year. Output cells
/// are valid only where both inputs are valid. The float-to-i16 cast
/// saturates at the type bounds.
pub fn diff(earlier: &RasterLayer, later: &RasterLayer) -> Result<DifferenceRaster> {
    if let Some(msg) = earlier.spec.congruence_mismatch(&later.spec) {
        return Err(RasterError::grid_mismatch(msg));
    }
    if earlier.spec.crs.is_some() != later.spec.crs.is_some() {
        return Err(RasterError::grid_mismatch(
            "only one input declares a spatial reference",
        ));
    }

    let validity = mask::combine(&[&earlier.validity, &later.validity])?;

    let values: Vec<i16> = earlier
        .values
        .par_iter()
        .zip(later.values.par_iter())
        .zip(validity.par_iter())
        .map(|((&a, &b), &valid)| {
            if valid {
                (b as f64 - a as f64) as i16
            } else {
                DIFF_NODATA
            }
        })
        .collect();

    let mut spec = earlier.spec.clone();
    spec.nodata = Some(DIFF_NODATA as f64);

    Ok(DifferenceRaster {
        spec,
        values,
        validity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomass_common::GeoTransform;

    fn layer(values: Vec<f32>, validity: Vec<bool>) -> RasterLayer {
        RasterLayer::new(GridSpec::new(2, 2), values, validity).unwrap()
    }

    #[test]
    fn test_diff_values_and_validity() {
        let a = layer(vec![10.0, 20.0, 30.0, 40.0], vec![true, true, false, true]);
        let b = layer(vec![15.0, 5.0, 31.0, 40.0], vec![true, true, true, false]);
        let d = diff(&a, &b).unwrap();
        assert_eq!(d.get(0), Some(5));
        assert_eq!(d.get(1), Some(-15));
        assert_eq!(d.get(2), None);
        assert_eq!(d.get(3), None);
        assert_eq!(d.values[2], DIFF_NODATA);
        assert_eq!(d.spec.nodata, Some(-32768.0));
    }

    #[test]
    fn test_diff_is_order_sensitive() {
        let a = layer(vec![1.0; 4], vec![true; 4]);
        let b = layer(vec![4.0; 4], vec![true; 4]);
        assert_eq!(diff(&a, &b).unwrap().values, vec![3; 4]);
        assert_eq!(diff(&b, &a).unwrap().values, vec![-3; 4]);
    }

    #[test]
    fn test_diff_saturates() {
        let a = layer(vec![-30000.0; 4], vec![true; 4]);
        let b = layer(vec![30000.0; 4], vec![true; 4]);
        assert_eq!(diff(&a, &b).unwrap().values, vec![i16::MAX; 4]);
    }

    #[test]
    fn test_diff_rejects_shape_mismatch() {
        let a = layer(vec![1.0; 4], vec![true; 4]);
        let b = RasterLayer::new(GridSpec::new(4, 1), vec![1.0; 4], vec![true; 4]).unwrap();
        assert!(matches!(diff(&a, &b), Err(RasterError::GridMismatch(_))));
    }

    #[test]
    fn test_diff_rejects_reference_mismatch() {
        let gt = GeoTransform::new(0.0, 60.0, 30.0, -30.0);
        let spec_a = GridSpec::new(2, 2).with_transform(gt).with_crs("EPSG:5070");
        let spec_b = GridSpec::new(2, 2).with_transform(gt).with_crs("EPSG:4326");
        let a = RasterLayer::new(spec_a.clone(), vec![1.0; 4], vec![true; 4]).unwrap();
        let b = RasterLayer::new(spec_b, vec![1.0; 4], vec![true; 4]).unwrap();
        assert!(matches!(diff(&a, &b), Err(RasterError::GridMismatch(_))));

        let unreferenced = RasterLayer::new(
            GridSpec::new(2, 2).with_transform(gt),
            vec![1.0; 4],
            vec![true; 4],
        )
        .unwrap();
        assert!(matches!(
            diff(&a, &unreferenced),
            Err(RasterError::GridMismatch(_))
        ));
    }
}
