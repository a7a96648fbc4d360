//! Grid reader abstraction.
//!
//! A [`LayerSource`] turns a layer path into a [`RasterLayer`], optionally
//! checking it against the grid the caller expects. [`FileLayerSource`]
//! reads GeoTIFF and Zarr files from the local filesystem.

pub(crate) mod geotiff;
pub(crate) mod zarr;

use std::path::Path;

use biomass_common::GridSpec;
use tracing::debug;

use crate::error::{RasterError, Result};
use crate::format::RasterFormat;
use crate::layer::RasterLayer;

pub use geotiff::read_geotiff;
pub use zarr::read_zarr;

/// Source of raster layers.
pub trait LayerSource: Send + Sync {
    /// Load the layer at `path`.
    ///
    /// Fails with `SourceUnavailable` if the layer cannot be located or
    /// decoded, and with `GridMismatch` if `expected` is given and the
    /// layer is not congruent with it.
    fn read(&self, path: &Path, expected: Option<&GridSpec>) -> Result<RasterLayer>;
}

/// Reads layers from local files, dispatching on the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLayerSource;

impl FileLayerSource {
    pub fn new() -> Self {
        Self
    }
}

impl LayerSource for FileLayerSource {
    fn read(&self, path: &Path, expected: Option<&GridSpec>) -> Result<RasterLayer> {
        if !path.exists() {
            return Err(RasterError::source_unavailable(path, "no such file"));
        }

        let format = RasterFormat::from_path(path)?;
        let layer = match format {
            RasterFormat::GeoTiff => read_geotiff(path),
            RasterFormat::Zarr => read_zarr(path),
        }
        .map_err(|e| match e {
            RasterError::GridMismatch(_) | RasterError::SourceUnavailable { .. } => e,
            other => RasterError::source_unavailable(path, other.to_string()),
        })?;

        if let Some(expected) = expected {
            if let Some(msg) = expected.congruence_mismatch(&layer.spec) {
                return Err(RasterError::grid_mismatch(format!(
                    "{}: {}",
                    path.display(),
                    msg
                )));
            }
        }

        debug!(
            path = %path.display(),
            format = format.as_str(),
            shape = %layer.spec.shape,
            "Read raster layer"
        );

        Ok(layer)
    }
}

/// Convert a decoded buffer of any primitive numeric type to `f32`.
pub(crate) fn to_f32<T>(buf: Vec<T>) -> Vec<f32>
where
    T: num_traits::AsPrimitive<f32>,
{
    buf.into_iter().map(|v| v.as_()).collect()
}
