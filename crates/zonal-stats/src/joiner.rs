//! Cell joining.
//!
//! Stacks co-registered layers into a columnar table of per-cell records,
//! dropping cells where every layer is invalid.

use rayon::prelude::*;
use raster_grid::{RasterError, RasterLayer};
use tracing::debug;

use crate::error::{Result, StatsError};

/// Columnar table of cell records.
///
/// Row `i` holds, for each named field, the value of that layer at scan
/// index `scan_index(i)`, or `None` where the layer was invalid. Rows are
/// in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct CellTable {
    names: Vec<String>,
    scan_indices: Vec<usize>,
    columns: Vec<Vec<Option<f32>>>,
}

impl CellTable {
    /// Number of retained cells.
    pub fn len(&self) -> usize {
        self.scan_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan_indices.is_empty()
    }

    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    /// Position of `name` among the fields.
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| StatsError::UnknownField(name.to_string()))
    }

    /// Values of one field, in row order.
    pub fn column(&self, name: &str) -> Result<&[Option<f32>]> {
        let idx = self.field_index(name)?;
        Ok(&self.columns[idx])
    }

    /// Scan index (row-major position in the source grid) of row `row`.
    pub fn scan_index(&self, row: usize) -> Option<usize> {
        self.scan_indices.get(row).copied()
    }

    /// All fields of one row.
    pub fn row(&self, row: usize) -> Option<Vec<Option<f32>>> {
        if row >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[row]).collect())
    }
}

/// Join named layers cell by cell.
///
/// All layers must have the same number of cells. A cell is kept unless it
/// is invalid in every layer.
pub fn join(layers: &[(&str, &RasterLayer)]) -> Result<CellTable> {
    let (_, first) = layers
        .first()
        .ok_or_else(|| RasterError::InvalidInput("no layers to join".to_string()))?;
    let cells = first.len();

    let mut names: Vec<String> = Vec::with_capacity(layers.len());
    for (name, layer) in layers {
        if layer.len() != cells || layer.validity.len() != cells {
            return Err(RasterError::grid_mismatch(format!(
                "layer '{}' has {} cells, expected {}",
                name,
                layer.len(),
                cells
            ))
            .into());
        }
        if names.iter().any(|n| n == name) {
            return Err(StatsError::DuplicateField(name.to_string()));
        }
        names.push(name.to_string());
    }

    let scan_indices: Vec<usize> = (0..cells)
        .into_par_iter()
        .filter(|&i| layers.iter().any(|(_, layer)| layer.validity[i]))
        .collect();

    let columns: Vec<Vec<Option<f32>>> = layers
        .iter()
        .map(|(_, layer)| {
            scan_indices
                .par_iter()
                .map(|&i| layer.get(i).filter(|v| v.is_finite()))
                .collect()
        })
        .collect();

    debug!(
        fields = ?names,
        cells = cells,
        retained = scan_indices.len(),
        "Joined layers"
    );

    Ok(CellTable {
        names,
        scan_indices,
        columns,
    })
}
