//! Sequential execution of phases.

use std::sync::Arc;

use anyhow::Result;
use raster_grid::{FileLayerSource, LayerSource};
use tracing::info;

use crate::config::PipelineConfig;
use crate::driver::BatchDriver;
use crate::external::{ExternalTool, GdalCommandTool};
use crate::phases::{Phase, PhasePlanner};
use crate::report::RunReport;

/// Runs phases one after another, each with its own worker pool.
pub struct Pipeline {
    planner: PhasePlanner,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Arc<dyn LayerSource>,
        tool: Arc<dyn ExternalTool>,
    ) -> Self {
        Self {
            planner: PhasePlanner::new(config, source, tool),
        }
    }

    /// Local files and the configured GDAL executables.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        let tool = GdalCommandTool::new(
            config.prepare.gdalwarp.clone(),
            config.prepare.gdal_rasterize.clone(),
        );
        Self::new(config, Arc::new(FileLayerSource::new()), Arc::new(tool))
    }

    pub fn planner(&self) -> &PhasePlanner {
        &self.planner
    }

    /// Run `phases` in order for one region or all of them.
    ///
    /// Each phase is planned only after the previous one has finished, so
    /// it sees that phase's outputs.
    pub async fn run(&self, phases: &[Phase], region: Option<&str>) -> Result<RunReport> {
        let config = self.planner.config();
        let regions = config.select_regions(region)?;
        let mut report = RunReport::new();

        for &phase in phases {
            let units = self.planner.plan(phase, &regions)?;
            let driver = BatchDriver::new(config.concurrency.for_phase(phase));
            let phase_report = driver.run_phase(phase, units).await;
            report.push(phase_report);
        }

        info!(
            phases = phases.len(),
            failed = report.has_failures(),
            "Pipeline run complete"
        );
        Ok(report)
    }
}
