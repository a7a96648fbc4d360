//! Pipeline phases and their work units.
//!
//! Phases run in order (prepare, mask, summarize, difference) and each
//! consumes files produced by the previous one. Planning a phase scans the
//! data root and expands into one unit per output file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use biomass_common::{LayerKind, Region};
use raster_grid::{diff, CellType, LayerSource, RasterLayer, RasterWriter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use zonal_stats::{aggregate, join, SummaryTable};

use crate::config::{PipelineConfig, RegionConfig};
use crate::discovery::{discover, Inventory};
use crate::driver::WorkUnit;
use crate::external::{ExternalTool, PrepareUnit, ToolRequest};
use crate::output::write_text_atomic;
use crate::templates::TemplateVars;

/// Grouping fields of every summary table.
pub const SUMMARY_KEYS: [&str; 2] = ["owner", "county"];

/// One stage of the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    Mask,
    Summarize,
    Difference,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 4] = [Phase::Prepare, Phase::Mask, Phase::Summarize, Phase::Difference];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Mask => "mask",
            Self::Summarize => "summarize",
            Self::Difference => "difference",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown phase '{}'", s))
    }
}

/// Expands phases into work units.
pub struct PhasePlanner {
    config: Arc<PipelineConfig>,
    source: Arc<dyn LayerSource>,
    tool: Arc<dyn ExternalTool>,
    writer: RasterWriter,
}

impl PhasePlanner {
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Arc<dyn LayerSource>,
        tool: Arc<dyn ExternalTool>,
    ) -> Self {
        let writer = RasterWriter::new(config.writer.clone());
        Self {
            config,
            source,
            tool,
            writer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Units of `phase` for the given regions, based on what currently
    /// exists under the data root.
    pub fn plan(&self, phase: Phase, regions: &[&RegionConfig]) -> Result<Vec<Arc<dyn WorkUnit>>> {
        let inventory = discover(&self.config)?;
        let mut units: Vec<Arc<dyn WorkUnit>> = Vec::new();

        for rc in regions {
            match phase {
                Phase::Prepare => self.plan_prepare(rc, &inventory, &mut units)?,
                Phase::Mask => self.plan_mask(rc, &inventory, &mut units)?,
                Phase::Summarize => self.plan_summarize(rc, &inventory, &mut units)?,
                Phase::Difference => self.plan_difference(rc, &inventory, &mut units)?,
            }
        }

        debug!(phase = %phase, units = units.len(), "Planned phase");
        Ok(units)
    }

    fn region_vars(region: &Region) -> TemplateVars {
        TemplateVars::new().region(region.name.clone())
    }

    /// Years of `kind` present for a region and inside the configured range.
    fn years_in_range(&self, inventory: &Inventory, kind: LayerKind, region: &str) -> Vec<u16> {
        inventory
            .years(kind, region)
            .into_iter()
            .filter(|y| self.config.years.contains(*y))
            .collect()
    }

    fn canopy_path(&self, region: &Region) -> Result<PathBuf> {
        self.config.layer_path(
            LayerKind::CanopyMask,
            &Self::region_vars(region).year_range(self.config.canopy_years),
        )
    }

    fn plan_prepare(
        &self,
        rc: &RegionConfig,
        inventory: &Inventory,
        units: &mut Vec<Arc<dyn WorkUnit>>,
    ) -> Result<()> {
        let region = &rc.region;
        let vars = Self::region_vars(region);
        let cutline = self.config.resolve(&rc.boundary);

        let ownership = ToolRequest::Warp {
            input: self.config.resolve(&self.config.paths.ownership_source),
            output: self.config.layer_path(LayerKind::Ownership, &vars)?,
            cutline: cutline.clone(),
            bounds: region.bbox,
            resolution: region.resolution,
            target_crs: Some(region.crs.clone()),
            resampling: Some("near".to_string()),
        };
        units.push(Arc::new(PrepareUnit::new(
            format!("prepare/{}/ownership", region.name),
            ownership,
            self.tool.clone(),
        )));

        let counties = ToolRequest::Rasterize {
            input: self.config.resolve(&rc.counties),
            output: self.config.layer_path(LayerKind::Counties, &vars)?,
            bounds: region.bbox,
            resolution: region.resolution,
            crs: region.crs.clone(),
            attribute: self.config.prepare.county_attribute.clone(),
            nodata: self.config.prepare.county_nodata,
        };
        units.push(Arc::new(PrepareUnit::new(
            format!("prepare/{}/counties", region.name),
            counties,
            self.tool.clone(),
        )));

        for record in inventory.of_kind(LayerKind::BiomassSource) {
            let Some(year) = record.year else { continue };
            if !self.config.years.contains(year) {
                continue;
            }
            // A regional source template restricts the source to its region.
            if record.region.as_deref().is_some_and(|r| r != region.name) {
                continue;
            }
            let request = ToolRequest::Warp {
                input: record.path.clone(),
                output: self
                    .config
                    .layer_path(LayerKind::Biomass, &vars.clone().year(year))?,
                cutline: cutline.clone(),
                bounds: region.bbox,
                resolution: region.resolution,
                target_crs: None,
                resampling: None,
            };
            units.push(Arc::new(PrepareUnit::new(
                format!("prepare/{}/biomass/{}", region.name, year),
                request,
                self.tool.clone(),
            )));
        }

        Ok(())
    }

    fn plan_mask(
        &self,
        rc: &RegionConfig,
        inventory: &Inventory,
        units: &mut Vec<Arc<dyn WorkUnit>>,
    ) -> Result<()> {
        let region = &rc.region;
        let canopy_mask = self.canopy_path(region)?;

        for year in self.years_in_range(inventory, LayerKind::Biomass, &region.name) {
            let vars = Self::region_vars(region).year(year);
            units.push(Arc::new(MaskUnit {
                region: region.name.clone(),
                year,
                biomass: self.config.layer_path(LayerKind::Biomass, &vars)?,
                canopy_mask: canopy_mask.clone(),
                zero_is_non_forest: self.config.canopy.zero_is_non_forest,
                output: self.config.layer_path(LayerKind::MaskedBiomass, &vars)?,
                cell_type: self.config.mask.cell_type,
                source: self.source.clone(),
                writer: self.writer.clone(),
            }));
        }
        Ok(())
    }

    fn plan_summarize(
        &self,
        rc: &RegionConfig,
        inventory: &Inventory,
        units: &mut Vec<Arc<dyn WorkUnit>>,
    ) -> Result<()> {
        let region = &rc.region;
        let base = Self::region_vars(region);
        let ownership = self.config.layer_path(LayerKind::Ownership, &base)?;
        let counties = self.config.layer_path(LayerKind::Counties, &base)?;
        let canopy_mask = if self.config.summary.use_canopy_mask {
            Some(self.canopy_path(region)?)
        } else {
            None
        };
        let input = self.config.summary.input;

        for year in self.years_in_range(inventory, input, &region.name) {
            let vars = base.clone().year(year);
            units.push(Arc::new(SummarizeUnit {
                region: region.name.clone(),
                year,
                ownership: ownership.clone(),
                counties: counties.clone(),
                biomass: self.config.layer_path(input, &vars)?,
                canopy_mask: canopy_mask.clone(),
                zero_is_non_forest: self.config.canopy.zero_is_non_forest,
                output: self.config.layer_path(LayerKind::Summary, &vars)?,
                source: self.source.clone(),
            }));
        }
        Ok(())
    }

    fn plan_difference(
        &self,
        rc: &RegionConfig,
        inventory: &Inventory,
        units: &mut Vec<Arc<dyn WorkUnit>>,
    ) -> Result<()> {
        let region = &rc.region;
        let input = self.config.difference.input;
        let years = self.years_in_range(inventory, input, &region.name);

        for pair in years.windows(2) {
            let (year1, year2) = (pair[0], pair[1]);
            let base = Self::region_vars(region);
            units.push(Arc::new(DifferenceUnit {
                region: region.name.clone(),
                year1,
                year2,
                earlier: self.config.layer_path(input, &base.clone().year(year1))?,
                later: self.config.layer_path(input, &base.clone().year(year2))?,
                output: self
                    .config
                    .layer_path(LayerKind::Difference, &base.pair(year1, year2))?,
                source: self.source.clone(),
                writer: self.writer.clone(),
            }));
        }
        Ok(())
    }
}

/// Forest cells of a canopy mask: its valid cells, minus valid zeros when
/// zero marks non-forest.
fn forest_cells(canopy: &RasterLayer, zero_is_non_forest: bool) -> Vec<bool> {
    if zero_is_non_forest {
        canopy.indicator_validity()
    } else {
        canopy.validity.clone()
    }
}

/// Applies the canopy mask to one year of biomass.
pub struct MaskUnit {
    pub region: String,
    pub year: u16,
    pub biomass: PathBuf,
    pub canopy_mask: PathBuf,
    pub zero_is_non_forest: bool,
    pub output: PathBuf,
    pub cell_type: CellType,
    source: Arc<dyn LayerSource>,
    writer: RasterWriter,
}

impl WorkUnit for MaskUnit {
    fn id(&self) -> String {
        format!("mask/{}/{}", self.region, self.year)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }

    #[instrument(skip_all, fields(region = %self.region, year = self.year))]
    fn run(&self) -> Result<()> {
        let biomass = self
            .source
            .read(&self.biomass, None)
            .context("Failed to read biomass")?;
        let canopy = self
            .source
            .read(&self.canopy_mask, Some(&biomass.spec))
            .context("Failed to read canopy mask")?;

        let masked = biomass.masked_by(&forest_cells(&canopy, self.zero_is_non_forest))?;

        let mut attributes = Map::new();
        attributes.insert("region".to_string(), json!(self.region));
        attributes.insert("year".to_string(), json!(self.year));
        attributes.insert(
            "canopy_mask".to_string(),
            Value::String(self.canopy_mask.display().to_string()),
        );

        let result = self
            .writer
            .write(&self.output, &masked, self.cell_type, attributes)?;
        info!(
            path = %result.path.display(),
            valid_cells = result.valid_cells,
            "Wrote masked biomass"
        );
        Ok(())
    }
}

/// Summarizes one year of biomass by ownership and county.
pub struct SummarizeUnit {
    pub region: String,
    pub year: u16,
    pub ownership: PathBuf,
    pub counties: PathBuf,
    pub biomass: PathBuf,
    pub canopy_mask: Option<PathBuf>,
    pub zero_is_non_forest: bool,
    pub output: PathBuf,
    source: Arc<dyn LayerSource>,
}

impl WorkUnit for SummarizeUnit {
    fn id(&self) -> String {
        format!("summarize/{}/{}", self.region, self.year)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }

    #[instrument(skip_all, fields(region = %self.region, year = self.year))]
    fn run(&self) -> Result<()> {
        let mut owner = self
            .source
            .read(&self.ownership, None)
            .context("Failed to read ownership")?;
        let grid = owner.spec.clone();
        let mut county = self
            .source
            .read(&self.counties, Some(&grid))
            .context("Failed to read counties")?;
        let mut biomass = self
            .source
            .read(&self.biomass, Some(&grid))
            .context("Failed to read biomass")?;

        if let Some(path) = &self.canopy_mask {
            let canopy = self
                .source
                .read(path, Some(&grid))
                .context("Failed to read canopy mask")?;
            let valid = forest_cells(&canopy, self.zero_is_non_forest);
            owner = owner.masked_by(&valid)?;
            county = county.masked_by(&valid)?;
            biomass = biomass.masked_by(&valid)?;
        }

        let table = join(&[("owner", &owner), ("county", &county), ("biomass", &biomass)])?;
        let rows = aggregate(&table, &SUMMARY_KEYS, "biomass")?;
        let groups = rows.len();
        let csv = SummaryTable::new(&SUMMARY_KEYS, rows).to_csv();

        write_text_atomic(&self.output, &csv, false)?;
        info!(path = %self.output.display(), groups, "Wrote summary table");
        Ok(())
    }
}

/// Differences two consecutive years of biomass.
pub struct DifferenceUnit {
    pub region: String,
    pub year1: u16,
    pub year2: u16,
    pub earlier: PathBuf,
    pub later: PathBuf,
    pub output: PathBuf,
    source: Arc<dyn LayerSource>,
    writer: RasterWriter,
}

impl WorkUnit for DifferenceUnit {
    fn id(&self) -> String {
        format!("difference/{}/{}-{}", self.region, self.year1, self.year2)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }

    #[instrument(skip_all, fields(region = %self.region, year1 = self.year1, year2 = self.year2))]
    fn run(&self) -> Result<()> {
        let earlier = self
            .source
            .read(&self.earlier, None)
            .with_context(|| format!("Failed to read biomass for {}", self.year1))?;
        let later = self
            .source
            .read(&self.later, Some(&earlier.spec))
            .with_context(|| format!("Failed to read biomass for {}", self.year2))?;

        let difference = diff(&earlier, &later)?;

        let mut attributes = Map::new();
        attributes.insert("region".to_string(), json!(self.region));
        attributes.insert("year1".to_string(), json!(self.year1));
        attributes.insert("year2".to_string(), json!(self.year2));

        let result =
            self.writer
                .write(&self.output, &difference.to_layer(), CellType::Int16, attributes)?;
        info!(
            path = %result.path.display(),
            valid_cells = result.valid_cells,
            "Wrote difference raster"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ToolOutcome;
    use biomass_common::GridSpec;
    use raster_grid::FileLayerSource;
    use test_utils::TestDataRoot;

    struct NoopTool;

    impl ExternalTool for NoopTool {
        fn run(&self, request: &ToolRequest) -> ToolOutcome {
            ToolOutcome::ok(request.output(), "noop")
        }
    }

    fn planner(root: &Path) -> PhasePlanner {
        let mut config = PipelineConfig::with_data_root(root);
        config.years = "1990-1992".parse().unwrap();
        PhasePlanner::new(
            Arc::new(config),
            Arc::new(FileLayerSource::new()),
            Arc::new(NoopTool),
        )
    }

    fn ids(units: &[Arc<dyn WorkUnit>]) -> Vec<String> {
        units.iter().map(|u| u.id()).collect()
    }

    #[test]
    fn test_phase_names() {
        assert_eq!("Summarize".parse::<Phase>().unwrap(), Phase::Summarize);
        assert!("clip".parse::<Phase>().is_err());
        assert_eq!(Phase::Difference.to_string(), "difference");
        assert_eq!(Phase::ALL[0], Phase::Prepare);
    }

    #[test]
    fn test_plan_prepare_uses_source_years_in_range() {
        let data = TestDataRoot::new().unwrap();
        for year in [1989, 1990, 1991] {
            data.touch(format!("external/landtrendr/biomass_{}.tif", year)).unwrap();
        }
        let planner = planner(data.path());
        let regions = planner.config().select_regions(Some("oregon")).unwrap();

        let units = planner.plan(Phase::Prepare, &regions).unwrap();
        assert_eq!(
            ids(&units),
            vec![
                "prepare/oregon/ownership",
                "prepare/oregon/counties",
                "prepare/oregon/biomass/1990",
                "prepare/oregon/biomass/1991",
            ]
        );
        assert_eq!(
            units[2].output_path(),
            data.join("interim/unmasked_biomass/oregon_biomass_1990.tif")
        );
    }

    #[test]
    fn test_plan_difference_pairs_adjacent_years() {
        let data = TestDataRoot::new().unwrap();
        for year in [1990, 1991, 1992, 1995] {
            data.touch(format!("interim/unmasked_biomass/washington_biomass_{}.tif", year))
                .unwrap();
        }
        let planner = planner(data.path());
        let regions = planner.config().select_regions(None).unwrap();

        let units = planner.plan(Phase::Difference, &regions).unwrap();
        // 1995 is outside the configured years
        assert_eq!(
            ids(&units),
            vec!["difference/washington/1990-1991", "difference/washington/1991-1992"]
        );
        assert_eq!(
            units[0].output_path(),
            data.join("interim/unmasked_biomass_differences/washington_diff_1990-1991.zarr")
        );
    }

    #[test]
    fn test_plan_summarize_and_mask_follow_biomass() {
        let data = TestDataRoot::new().unwrap();
        data.touch("interim/unmasked_biomass/oregon_biomass_1991.tif").unwrap();
        let planner = planner(data.path());
        let regions = planner.config().select_regions(None).unwrap();

        let summarize = planner.plan(Phase::Summarize, &regions).unwrap();
        assert_eq!(ids(&summarize), vec!["summarize/oregon/1991"]);
        assert_eq!(
            summarize[0].output_path(),
            data.join("processed/oregon_1991_summary.csv")
        );

        let mask = planner.plan(Phase::Mask, &regions).unwrap();
        assert_eq!(ids(&mask), vec!["mask/oregon/1991"]);
    }

    fn seed_canopy_pair(data: &TestDataRoot) -> (PathBuf, PathBuf) {
        let biomass_path = data.join("interim/unmasked_biomass/oregon_biomass_1990.tif");
        let canopy_path = data.join("interim/canopy_cover/oregon_canopy_mask_2000-2015.tif");
        let biomass =
            RasterLayer::from_values(GridSpec::new(2, 1).with_nodata(-32768.0), vec![10.0, 20.0])
                .unwrap();
        // Valid zero in the second cell
        let canopy =
            RasterLayer::from_values(GridSpec::new(2, 1).with_nodata(255.0), vec![1.0, 0.0])
                .unwrap();
        let writer = RasterWriter::default();
        writer.write_layer(&biomass_path, &biomass, CellType::Int16).unwrap();
        writer.write_layer(&canopy_path, &canopy, CellType::Int16).unwrap();
        (biomass_path, canopy_path)
    }

    fn run_mask(data: &TestDataRoot, zero_is_non_forest: bool, output: &str) -> Vec<bool> {
        let (biomass, canopy_mask) = seed_canopy_pair(data);
        let unit = MaskUnit {
            region: "oregon".into(),
            year: 1990,
            biomass,
            canopy_mask,
            zero_is_non_forest,
            output: data.join(output),
            cell_type: CellType::Float32,
            source: Arc::new(FileLayerSource::new()),
            writer: RasterWriter::default(),
        };
        unit.run().unwrap();
        FileLayerSource::new()
            .read(&data.join(output), None)
            .unwrap()
            .validity
    }

    #[test]
    fn test_mask_keeps_cells_where_canopy_is_valid() {
        let data = TestDataRoot::new().unwrap();
        let validity = run_mask(&data, false, "interim/masked_biomass/oregon_biomass_1990.zarr");
        assert_eq!(validity, vec![true, true]);
    }

    #[test]
    fn test_mask_can_treat_zero_as_non_forest() {
        let data = TestDataRoot::new().unwrap();
        let validity = run_mask(&data, true, "interim/masked_biomass/oregon_biomass_1990.zarr");
        assert_eq!(validity, vec![true, false]);
    }
}
