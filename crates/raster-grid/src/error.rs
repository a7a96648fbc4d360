//! Error types for raster grid operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, combining or writing rasters.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The input layer is missing or unreadable.
    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// Layers expected to be co-registered are not.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// The path does not name a raster format we handle.
    #[error("unsupported raster format: {0}")]
    UnsupportedFormat(String),

    /// Caller supplied arguments that cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// TIFF decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// TIFF encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// Output already present; outputs are never overwritten.
    #[error("output already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RasterError {
    /// Create a SourceUnavailable error.
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a GridMismatch error.
    pub fn grid_mismatch(msg: impl Into<String>) -> Self {
        Self::GridMismatch(msg.into())
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl ToString) -> Self {
        Self::Zarr(msg.to_string())
    }
}

impl From<tiff::TiffError> for RasterError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
