//! Error types for zonal statistics.

use raster_grid::RasterError;
use thiserror::Error;

/// Errors that can occur while joining layers or reading summaries.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Layers could not be joined cell by cell.
    #[error(transparent)]
    Grid(#[from] RasterError),

    /// A field name that is not a column of the table.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Two joined layers were given the same name.
    #[error("duplicate field: {0}")]
    DuplicateField(String),

    /// Malformed summary table text.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StatsError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for zonal statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;
