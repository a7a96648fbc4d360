//! Pipeline configuration.
//!
//! Loaded from YAML with `${VAR}` environment substitution. Everything the
//! phases need (regions, years, file layout, concurrency) lives here and
//! is passed down explicitly.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use biomass_common::{LayerKind, Region, YearRange};
use raster_grid::{CellType, WriterConfig};
use serde::{Deserialize, Serialize};

use crate::phases::Phase;
use crate::templates::{PathTemplate, TemplateVars};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory all path templates are relative to.
    pub data_root: PathBuf,

    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,

    /// Years processed by the annual phases.
    #[serde(default = "default_years")]
    pub years: YearRange,

    /// Span of the canopy cover mask (`{year_range}` in its template).
    #[serde(default = "default_canopy_years")]
    pub canopy_years: YearRange,

    #[serde(default)]
    pub paths: PathTemplates,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub prepare: PrepareOptions,

    #[serde(default)]
    pub canopy: CanopyOptions,

    #[serde(default)]
    pub mask: MaskOptions,

    #[serde(default)]
    pub summary: SummaryOptions,

    #[serde(default)]
    pub difference: DifferenceOptions,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A region with the vector inputs used to build its grids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    #[serde(flatten)]
    pub region: Region,

    /// Boundary polygon used as the clipping cutline (relative to data_root).
    pub boundary: PathBuf,

    /// County polygons for this region with a GEOID attribute.
    pub counties: PathBuf,
}

impl RegionConfig {
    pub fn name(&self) -> &str {
        &self.region.name
    }
}

/// Where each layer kind lives, relative to `data_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathTemplates {
    pub biomass_source: PathTemplate,
    pub ownership_source: PathBuf,
    pub biomass: PathTemplate,
    pub masked_biomass: PathTemplate,
    pub ownership: PathTemplate,
    pub counties: PathTemplate,
    pub canopy_mask: PathTemplate,
    pub summary: PathTemplate,
    pub difference: PathTemplate,
    pub consolidated: PathBuf,
}

fn template(raw: &'static str) -> PathTemplate {
    PathTemplate::from_static(raw)
}

impl Default for PathTemplates {
    fn default() -> Self {
        Self {
            biomass_source: template("external/landtrendr/biomass_{year}.tif"),
            ownership_source: PathBuf::from("external/usfs/forown2016.tif"),
            biomass: template("interim/unmasked_biomass/{region}_biomass_{year}.tif"),
            masked_biomass: template("interim/masked_biomass/{region}_biomass_{year}.zarr"),
            ownership: template("interim/{region}_ownership.tif"),
            counties: template("interim/{region}_counties.tif"),
            canopy_mask: template("interim/canopy_cover/{region}_canopy_mask_{year_range}.tif"),
            summary: template("processed/{region}_{year}_summary.csv"),
            difference: template(
                "interim/unmasked_biomass_differences/{region}_diff_{year1}-{year2}.zarr",
            ),
            consolidated: PathBuf::from("processed/biomass_summary.csv"),
        }
    }
}

impl PathTemplates {
    /// Template for a layer kind.
    pub fn get(&self, kind: LayerKind) -> &PathTemplate {
        match kind {
            LayerKind::BiomassSource => &self.biomass_source,
            LayerKind::Biomass => &self.biomass,
            LayerKind::MaskedBiomass => &self.masked_biomass,
            LayerKind::Ownership => &self.ownership,
            LayerKind::Counties => &self.counties,
            LayerKind::CanopyMask => &self.canopy_mask,
            LayerKind::Summary => &self.summary,
            LayerKind::Difference => &self.difference,
        }
    }
}

/// Worker pool size per phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub prepare: usize,
    pub mask: usize,
    pub summarize: usize,
    pub difference: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            prepare: 12,
            mask: 4,
            summarize: 2,
            difference: 16,
        }
    }
}

impl ConcurrencyConfig {
    pub fn for_phase(&self, phase: Phase) -> usize {
        match phase {
            Phase::Prepare => self.prepare,
            Phase::Mask => self.mask,
            Phase::Summarize => self.summarize,
            Phase::Difference => self.difference,
        }
    }
}

/// External tool settings for the prepare phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareOptions {
    pub gdalwarp: String,
    pub gdal_rasterize: String,
    /// Attribute burned into the county raster.
    pub county_attribute: String,
    pub county_nodata: i64,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            gdalwarp: "gdalwarp".to_string(),
            gdal_rasterize: "gdal_rasterize".to_string(),
            county_attribute: "GEOID".to_string(),
            county_nodata: 0,
        }
    }
}

/// How the canopy cover raster selects forest cells.
///
/// By default every valid mask cell is forest. Rasters that encode
/// non-forest as a valid 0 need `zero_is_non_forest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanopyOptions {
    pub zero_is_non_forest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    pub cell_type: CellType,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            cell_type: CellType::Float32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    /// Intersect every input with the canopy mask before joining.
    pub use_canopy_mask: bool,
    /// Biomass layer summarized (`biomass` or `masked_biomass`).
    pub input: LayerKind,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            use_canopy_mask: false,
            input: LayerKind::Biomass,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferenceOptions {
    /// Biomass layer differenced (`biomass` or `masked_biomass`).
    pub input: LayerKind,
}

impl Default for DifferenceOptions {
    fn default() -> Self {
        Self {
            input: LayerKind::Biomass,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

fn default_regions() -> Vec<RegionConfig> {
    ["oregon", "washington"]
        .into_iter()
        .map(|name| RegionConfig {
            region: if name == "oregon" {
                Region::oregon()
            } else {
                Region::washington()
            },
            boundary: PathBuf::from(format!("raw/{}_state_boundary.shp", name)),
            counties: PathBuf::from(format!("interim/{}_counties.shp", name)),
        })
        .collect()
}

fn default_years() -> YearRange {
    YearRange {
        start: 1984,
        end: 2017,
    }
}

fn default_canopy_years() -> YearRange {
    YearRange {
        start: 2000,
        end: 2015,
    }
}

impl PipelineConfig {
    /// Configuration with built-in defaults rooted at `data_root`.
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            regions: default_regions(),
            years: default_years(),
            canopy_years: default_canopy_years(),
            paths: PathTemplates::default(),
            concurrency: ConcurrencyConfig::default(),
            writer: WriterConfig::default(),
            prepare: PrepareOptions::default(),
            canopy: CanopyOptions::default(),
            mask: MaskOptions::default(),
            summary: SummaryOptions::default(),
            difference: DifferenceOptions::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load, expand and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config from {:?}", path))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = shellexpand::env(content)
            .map_err(|e| anyhow::anyhow!("Environment variable {} not set", e.var_name))?;

        let config: PipelineConfig = serde_yaml::from_str(&expanded)
            .with_context(|| "Failed to parse pipeline config YAML")?;

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            bail!("At least one region must be configured");
        }

        let mut seen = HashSet::new();
        for rc in &self.regions {
            let name = rc.name();
            if name.is_empty() || name.contains('/') {
                bail!("Invalid region name '{}'", name);
            }
            if !seen.insert(name.to_string()) {
                bail!("Region '{}' configured twice", name);
            }
            if !rc.region.bbox.is_valid() {
                bail!("Region '{}' has an inverted bounding box", name);
            }
            if rc.region.resolution <= 0.0 {
                bail!("Region '{}' resolution must be > 0", name);
            }
        }

        for kind in [
            LayerKind::Biomass,
            LayerKind::MaskedBiomass,
            LayerKind::Ownership,
            LayerKind::Counties,
            LayerKind::CanopyMask,
            LayerKind::Summary,
            LayerKind::Difference,
        ] {
            if !self.paths.get(kind).has_region() {
                bail!("Path template for {} must contain {{region}}", kind);
            }
        }

        for (label, input) in [
            ("summary.input", self.summary.input),
            ("difference.input", self.difference.input),
        ] {
            if !matches!(input, LayerKind::Biomass | LayerKind::MaskedBiomass) {
                bail!("{} must be biomass or masked_biomass, got {}", label, input);
            }
        }

        for phase in Phase::ALL {
            if self.concurrency.for_phase(phase) == 0 {
                bail!("Concurrency for phase {} must be > 0", phase);
            }
        }

        self.writer
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid writer config: {}", e))?;

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            bail!("logging.format must be json or pretty");
        }

        Ok(())
    }

    /// Regions selected by name, or all of them.
    pub fn select_regions(&self, name: Option<&str>) -> Result<Vec<&RegionConfig>> {
        match name {
            None => Ok(self.regions.iter().collect()),
            Some(name) => {
                let rc = self
                    .regions
                    .iter()
                    .find(|r| r.name().eq_ignore_ascii_case(name))
                    .with_context(|| format!("Unknown region '{}'", name))?;
                Ok(vec![rc])
            }
        }
    }

    /// Absolute path of a layer.
    pub fn layer_path(&self, kind: LayerKind, vars: &TemplateVars) -> Result<PathBuf> {
        let relative = self.paths.get(kind).render(vars)?;
        Ok(self.data_root.join(relative))
    }

    /// Absolute path under the data root.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.data_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
data_root: /data/biomass
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = PipelineConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.regions[0].name(), "oregon");
        assert_eq!(config.years, YearRange::new(1984, 2017).unwrap());
        assert_eq!(config.concurrency.summarize, 2);
        assert_eq!(config.writer.chunk_size, 256);
        assert!(!config.summary.use_canopy_mask);
        assert!(!config.canopy.zero_is_non_forest);

        let path = config
            .layer_path(
                LayerKind::Difference,
                &TemplateVars::new().region("oregon").pair(1990, 1991),
            )
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from(
                "/data/biomass/interim/unmasked_biomass_differences/oregon_diff_1990-1991.zarr"
            )
        );
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("BIOMASS_TEST_ROOT", "/mnt/forest");
        let config = PipelineConfig::from_yaml("data_root: ${BIOMASS_TEST_ROOT}/data\n").unwrap();
        assert_eq!(config.data_root, PathBuf::from("/mnt/forest/data"));
    }

    #[test]
    fn test_missing_env_var_is_error() {
        std::env::remove_var("BIOMASS_TEST_UNSET");
        assert!(PipelineConfig::from_yaml("data_root: ${BIOMASS_TEST_UNSET}\n").is_err());
    }

    #[test]
    fn test_full_region_block() {
        let yaml = r#"
data_root: /data
regions:
  - name: oregon
    bbox: [-2294730, 2301450, -1584300, 2906130]
    resolution: 30
    crs: EPSG:5070
    boundary: raw/oregon_state_boundary.shp
    counties: interim/oregon_counties.shp
years: 1990-1995
summary:
  use_canopy_mask: true
  input: masked_biomass
canopy:
  zero_is_non_forest: true
concurrency:
  difference: 3
writer:
  compression: blosc_lz4
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].region, Region::oregon());
        assert_eq!(config.years.start, 1990);
        assert!(config.summary.use_canopy_mask);
        assert!(config.canopy.zero_is_non_forest);
        assert_eq!(config.summary.input, LayerKind::MaskedBiomass);
        assert_eq!(config.concurrency.difference, 3);
        assert_eq!(config.concurrency.mask, 4);
    }

    #[test]
    fn test_validation_failures() {
        let dup = r#"
data_root: /data
regions:
  - {name: oregon, bbox: [0, 0, 30, 30], resolution: 30, crs: "EPSG:5070", boundary: a.shp, counties: b.shp}
  - {name: oregon, bbox: [0, 0, 30, 30], resolution: 30, crs: "EPSG:5070", boundary: a.shp, counties: b.shp}
"#;
        assert!(PipelineConfig::from_yaml(dup).is_err());

        let zero = "data_root: /data\nconcurrency:\n  mask: 0\n";
        assert!(PipelineConfig::from_yaml(zero).is_err());

        let bad_input = "data_root: /data\ndifference:\n  input: summary\n";
        assert!(PipelineConfig::from_yaml(bad_input).is_err());

        let no_region = "data_root: /data\npaths:\n  summary: processed/{year}.csv\n";
        assert!(PipelineConfig::from_yaml(no_region).is_err());
    }

    #[test]
    fn test_default_templates_parse() {
        let paths = PathTemplates::default();
        for kind in LayerKind::ALL {
            let raw = paths.get(kind).as_str();
            assert!(PathTemplate::new(raw).is_ok(), "{}", raw);
        }
    }

    #[test]
    fn test_written_rasters_default_to_tiled_output() {
        use raster_grid::RasterFormat;

        let config = PipelineConfig::with_data_root("/data");
        let vars = TemplateVars::new().region("oregon").year(1990).pair(1990, 1991);
        for kind in [LayerKind::MaskedBiomass, LayerKind::Difference] {
            let path = config.layer_path(kind, &vars).unwrap();
            assert_eq!(RasterFormat::from_path(&path).unwrap(), RasterFormat::Zarr, "{}", kind);
        }
    }

    #[test]
    fn test_shipped_config_loads() {
        std::env::set_var("BIOMASS_DATA_ROOT", "/srv/biomass");
        let yaml = include_str!("../../../config/pipeline.yaml");
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/biomass"));
        assert_eq!(config.regions[1].region, Region::washington());
        assert_eq!(config.canopy_years, YearRange::new(2000, 2015).unwrap());
        assert_eq!(config.mask.cell_type, CellType::Float32);
        assert!(config.paths.difference.as_str().ends_with(".zarr"));
        assert!(config.paths.masked_biomass.as_str().ends_with(".zarr"));
    }

    #[test]
    fn test_select_regions() {
        let config = PipelineConfig::with_data_root("/data");
        assert_eq!(config.select_regions(None).unwrap().len(), 2);
        let wa = config.select_regions(Some("Washington")).unwrap();
        assert_eq!(wa[0].name(), "washington");
        assert!(config.select_regions(Some("idaho")).is_err());
    }
}
