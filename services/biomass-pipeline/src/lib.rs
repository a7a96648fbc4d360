//! Forest biomass batch pipeline.
//!
//! Clips annual biomass rasters to each region, optionally masks them to
//! forest canopy, summarizes biomass by land ownership and county, and
//! computes year-over-year differences. Every phase is a set of
//! independent, idempotent work units run with bounded concurrency.

pub mod config;
pub mod consolidate;
pub mod discovery;
pub mod driver;
pub mod external;
mod output;
pub mod phases;
pub mod pipeline;
pub mod report;
pub mod templates;

pub use config::{PipelineConfig, RegionConfig};
pub use consolidate::{consolidate, ConsolidationResult};
pub use discovery::{discover, Inventory, LayerRecord};
pub use driver::{BatchDriver, PhaseReport, StateHook, UnitReport, UnitState, WorkUnit};
pub use external::{ExternalTool, GdalCommandTool, ToolOutcome, ToolRequest};
pub use phases::{Phase, PhasePlanner};
pub use pipeline::Pipeline;
pub use report::{ReportFormat, RunReport};
pub use templates::{PathTemplate, TemplateVars};
