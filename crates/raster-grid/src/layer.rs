//! In-memory raster layers with independently tracked validity.

use biomass_common::GridSpec;
use rayon::prelude::*;

use crate::error::{RasterError, Result};
use crate::mask;

/// A single-band raster held in memory.
///
/// `values` and `validity` are row-major, top-to-bottom. Values of invalid
/// cells are unspecified and must not be read without checking validity.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub spec: GridSpec,
    pub values: Vec<f32>,
    pub validity: Vec<bool>,
}

impl RasterLayer {
    /// Create a layer, checking that both arrays match the grid.
    pub fn new(spec: GridSpec, values: Vec<f32>, validity: Vec<bool>) -> Result<Self> {
        let cells = spec.cell_count();
        if values.len() != cells || validity.len() != cells {
            return Err(RasterError::grid_mismatch(format!(
                "grid {} needs {} cells, got {} values and {} validity flags",
                spec.shape,
                cells,
                values.len(),
                validity.len()
            )));
        }
        Ok(Self {
            spec,
            values,
            validity,
        })
    }

    /// Create a layer whose validity is derived from the values alone:
    /// NaN and the grid's declared no-data value are invalid.
    pub fn from_values(spec: GridSpec, values: Vec<f32>) -> Result<Self> {
        let validity = embedded_validity(&values, spec.nodata);
        Self::new(spec, values, validity)
    }

    pub fn width(&self) -> usize {
        self.spec.width()
    }

    pub fn height(&self) -> usize {
        self.spec.height()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a scan index, `None` when invalid or out of range.
    pub fn get(&self, index: usize) -> Option<f32> {
        match self.validity.get(index) {
            Some(true) => self.values.get(index).copied(),
            _ => None,
        }
    }

    /// Value at (col, row), `None` when invalid or out of range.
    pub fn get_at(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width() || row >= self.height() {
            return None;
        }
        self.get(row * self.width() + col)
    }

    /// Number of valid cells.
    pub fn valid_count(&self) -> usize {
        self.validity.par_iter().filter(|&&v| v).count()
    }

    /// Fail with `GridMismatch` unless this layer is congruent with `expected`.
    pub fn ensure_congruent(&self, expected: &GridSpec) -> Result<()> {
        match expected.congruence_mismatch(&self.spec) {
            Some(msg) => Err(RasterError::grid_mismatch(msg)),
            None => Ok(()),
        }
    }

    /// Read the layer as a 0/1 indicator: a cell is valid only where it is
    /// valid and non-zero.
    pub fn indicator_validity(&self) -> Vec<bool> {
        self.values
            .par_iter()
            .zip(self.validity.par_iter())
            .map(|(&v, &valid)| valid && v != 0.0)
            .collect()
    }

    /// Intersect this layer's validity with an external mask.
    ///
    /// Invalidated cells are rewritten to the layer's no-data value (NaN if
    /// it has none) so the result can be persisted directly.
    pub fn masked_by(&self, external: &[bool]) -> Result<RasterLayer> {
        let validity = mask::combine(&[&self.validity, external])?;
        let nodata = self.spec.nodata.map(|v| v as f32).unwrap_or(f32::NAN);
        let values = mask::apply(&self.values, &validity, nodata)?;
        Ok(RasterLayer {
            spec: self.spec.clone(),
            values,
            validity,
        })
    }
}

/// Validity implied by the stored values themselves.
pub fn embedded_validity(values: &[f32], nodata: Option<f64>) -> Vec<bool> {
    match nodata {
        Some(nd) if !nd.is_nan() => {
            let nd = nd as f32;
            values.par_iter().map(|&v| !v.is_nan() && v != nd).collect()
        }
        _ => values.par_iter().map(|&v| !v.is_nan()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let spec = GridSpec::new(2, 2);
        let err = RasterLayer::new(spec, vec![1.0; 3], vec![true; 4]).unwrap_err();
        assert!(matches!(err, RasterError::GridMismatch(_)));
    }

    #[test]
    fn test_from_values_uses_nodata() {
        let spec = GridSpec::new(2, 2).with_nodata(-9999.0);
        let layer = RasterLayer::from_values(spec, vec![1.0, -9999.0, f32::NAN, 4.0]).unwrap();
        assert_eq!(layer.validity, vec![true, false, false, true]);
        assert_eq!(layer.valid_count(), 2);
        assert_eq!(layer.get(1), None);
        assert_eq!(layer.get_at(1, 1), Some(4.0));
        assert_eq!(layer.get_at(2, 0), None);
    }

    #[test]
    fn test_masked_by_keeps_own_nodata() {
        let spec = GridSpec::new(2, 2).with_nodata(0.0);
        let layer = RasterLayer::from_values(spec, vec![0.0, 2.0, 3.0, 4.0]).unwrap();
        // External mask allows everything but the last cell.
        let masked = layer.masked_by(&[true, true, true, false]).unwrap();
        assert_eq!(masked.validity, vec![false, true, true, false]);
        assert_eq!(masked.values, vec![0.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_indicator_validity() {
        let spec = GridSpec::new(4, 1).with_nodata(255.0);
        let canopy = RasterLayer::from_values(spec, vec![1.0, 0.0, 255.0, 1.0]).unwrap();
        assert_eq!(canopy.indicator_validity(), vec![true, false, false, true]);
    }
}
