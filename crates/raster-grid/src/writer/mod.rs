//! Raster persistence.
//!
//! Outputs are written to a temporary sibling and moved into place only
//! once complete, so a crashed or failed write never leaves a partial
//! file at the final path. Existing outputs are never replaced.

mod geotiff_writer;
mod zarr_writer;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use biomass_common::GridShape;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::WriterConfig;
use crate::error::{RasterError, Result};
use crate::format::{CellType, RasterFormat};
use crate::layer::RasterLayer;
use crate::mask;

use geotiff_writer::encode_geotiff;
use zarr_writer::ZarrWriter;

/// Result of a successful write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub path: PathBuf,
    pub format: RasterFormat,
    pub cell_type: CellType,
    pub shape: GridShape,
    pub valid_cells: usize,
    /// Uncompressed payload size.
    pub bytes_written: u64,
}

/// Writes [`RasterLayer`]s as GeoTIFF or Zarr, chosen by extension.
#[derive(Debug, Clone, Default)]
pub struct RasterWriter {
    config: WriterConfig,
}

impl RasterWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Persist `layer` without extra metadata.
    pub fn write_layer(
        &self,
        path: &Path,
        layer: &RasterLayer,
        cell_type: CellType,
    ) -> Result<WriteResult> {
        self.write(path, layer, cell_type, Map::new())
    }

    /// Persist `layer` at `path` with the given cell type.
    ///
    /// Invalid cells are stored as the layer's no-data value, or the cell
    /// type's default when the layer declares none or declares one the
    /// cell type cannot represent. `attributes` are stored
    /// as Zarr group metadata and ignored for GeoTIFF.
    pub fn write(
        &self,
        path: &Path,
        layer: &RasterLayer,
        cell_type: CellType,
        attributes: Map<String, Value>,
    ) -> Result<WriteResult> {
        let start = Instant::now();

        if path.exists() {
            return Err(RasterError::AlreadyExists(path.to_path_buf()));
        }
        let format = RasterFormat::from_path(path)?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // A no-data value the cell type cannot hold exactly would read back
        // as a valid cell, so it is replaced by the type's default.
        let nodata = match layer.spec.nodata {
            Some(nd) if cell_type.can_represent(nd) => nd,
            Some(nd) => {
                debug!(
                    nodata = nd,
                    cell_type = cell_type.as_str(),
                    "No-data value not representable, using cell type default"
                );
                cell_type.default_nodata()
            }
            None => cell_type.default_nodata(),
        };
        let values = mask::apply(&layer.values, &layer.validity, nodata as f32)?;

        let mut spec = layer.spec.clone();
        spec.nodata = Some(nodata);

        match format {
            RasterFormat::GeoTiff => {
                let mut tmp = tempfile::Builder::new()
                    .prefix(".partial-")
                    .suffix(".tif")
                    .tempfile_in(parent)?;
                {
                    let mut writer = BufWriter::new(tmp.as_file_mut());
                    encode_geotiff(
                        &mut writer,
                        &values,
                        &spec,
                        cell_type,
                        nodata,
                        self.config.chunk_size as u32,
                    )?;
                    writer.flush()?;
                }
                tmp.as_file().sync_all()?;
                tmp.persist_noclobber(path).map_err(|e| {
                    if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                        RasterError::AlreadyExists(path.to_path_buf())
                    } else {
                        RasterError::Io(e.error)
                    }
                })?;
            }
            RasterFormat::Zarr => {
                let tmp = tempfile::Builder::new()
                    .prefix(".partial-")
                    .suffix(".zarr")
                    .tempdir_in(parent)?;
                ZarrWriter::new(&self.config).write(
                    tmp.path(),
                    &values,
                    &layer.validity,
                    &spec,
                    cell_type,
                    nodata,
                    attributes,
                )?;
                // Claim the final path first. create_dir fails on anything
                // already there, and rename only replaces the empty claim.
                fs::create_dir(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::AlreadyExists {
                        RasterError::AlreadyExists(path.to_path_buf())
                    } else {
                        RasterError::Io(e)
                    }
                })?;
                // The TempDir guard's cleanup is a no-op once renamed.
                if let Err(e) = fs::rename(tmp.path(), path) {
                    let _ = fs::remove_dir(path);
                    return Err(RasterError::Io(e));
                }
            }
        }

        let result = WriteResult {
            path: path.to_path_buf(),
            format,
            cell_type,
            shape: spec.shape,
            valid_cells: layer.valid_count(),
            bytes_written: (values.len() * cell_type.size_of()) as u64,
        };

        info!(
            path = %path.display(),
            format = format.as_str(),
            cell_type = cell_type.as_str(),
            shape = %result.shape,
            valid_cells = result.valid_cells,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Wrote raster"
        );
        debug!(bytes = result.bytes_written, "Raster payload size");

        Ok(result)
    }
}
