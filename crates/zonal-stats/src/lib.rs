//! Zonal statistics over aligned raster layers.
//!
//! Layers are joined cell by cell into a [`CellTable`], then grouped by
//! categorical key fields (ownership, county) and summarized into
//! [`SummaryRow`]s that can be written as CSV.
//!
//! # Example
//!
//! ```ignore
//! use zonal_stats::{aggregate, join, SummaryTable};
//!
//! let table = join(&[("owner", &owner), ("county", &county), ("biomass", &biomass)])?;
//! let rows = aggregate(&table, &["owner", "county"], "biomass")?;
//! let csv = SummaryTable::new(&["owner", "county"], rows).to_csv();
//! ```

pub mod aggregate;
pub mod error;
pub mod joiner;
pub mod summary;

pub use aggregate::{aggregate, round1};
pub use error::{Result, StatsError};
pub use joiner::{join, CellTable};
pub use summary::{NullableInt, SummaryRow, SummaryTable, STAT_FIELDS};
