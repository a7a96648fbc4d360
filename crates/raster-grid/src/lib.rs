//! Raster layers for aligned biomass grids.
//!
//! This crate reads single-band GeoTIFF and Zarr rasters into memory with
//! explicit per-cell validity, combines validity masks, computes
//! year-over-year differences and writes results back as compressed
//! rasters.
//!
//! # Example
//!
//! ```ignore
//! use raster_grid::{FileLayerSource, LayerSource, RasterWriter, CellType, diff};
//!
//! let source = FileLayerSource::new();
//! let a = source.read("oregon_biomass_1990.tif".as_ref(), None)?;
//! let b = source.read("oregon_biomass_1991.tif".as_ref(), Some(&a.spec))?;
//! let change = diff(&a, &b)?;
//! RasterWriter::default().write(
//!     "oregon_diff_1990-1991.zarr".as_ref(),
//!     &change.to_layer(),
//!     CellType::Int16,
//!     Default::default(),
//! )?;
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod format;
pub mod layer;
pub mod mask;
pub mod reader;
pub mod writer;

pub use config::{WriterConfig, ZarrCompression};
pub use diff::{diff, DifferenceRaster, DIFF_NODATA};
pub use error::{RasterError, Result};
pub use format::{CellType, RasterFormat};
pub use layer::RasterLayer;
pub use reader::{read_geotiff, read_zarr, FileLayerSource, LayerSource};
pub use writer::{RasterWriter, WriteResult};
