//! Consolidation of per-year summary tables into one long-form table.
//!
//! Every discovered summary CSV contributes its rows prefixed with its
//! region and year. A file that cannot be read or parsed is skipped and
//! listed in the result; it never fails the whole consolidation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use biomass_common::LayerKind;
use serde::Serialize;
use tracing::{info, warn};
use zonal_stats::{SummaryTable, STAT_FIELDS};

use crate::config::{PipelineConfig, RegionConfig};
use crate::discovery::discover;
use crate::output::write_text_atomic;
use crate::phases::SUMMARY_KEYS;

/// A summary file left out of the consolidated table.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationResult {
    pub output: PathBuf,
    pub files_read: usize,
    pub rows_written: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Header of the consolidated table.
pub fn consolidated_header() -> String {
    ["region", "year"]
        .iter()
        .chain(SUMMARY_KEYS.iter())
        .chain(STAT_FIELDS.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(",")
}

/// Merge the summary tables of `regions` into the configured consolidated
/// output. An existing output is replaced only when `force` is set.
pub fn consolidate(
    config: &PipelineConfig,
    regions: &[&RegionConfig],
    force: bool,
) -> Result<ConsolidationResult> {
    let output = config.resolve(&config.paths.consolidated);
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to replace it)",
            output.display()
        );
    }

    let inventory = discover(config)?;
    let mut text = consolidated_header();
    text.push('\n');

    let mut files_read = 0;
    let mut rows_written = 0;
    let mut skipped = Vec::new();

    for record in inventory.of_kind(LayerKind::Summary) {
        let (Some(region), Some(year)) = (record.region.as_deref(), record.year) else {
            continue;
        };
        if !regions.iter().any(|rc| rc.name() == region) || !config.years.contains(year) {
            continue;
        }

        match read_summary(&record.path) {
            Ok(table) => {
                files_read += 1;
                for row in &table.rows {
                    text.push_str(&format!("{},{},{}\n", region, year, row.csv_fields().join(",")));
                    rows_written += 1;
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(path = %record.path.display(), error = %reason, "Skipping summary file");
                skipped.push(SkippedFile {
                    path: record.path.clone(),
                    reason,
                });
            }
        }
    }

    write_text_atomic(&output, &text, force)?;

    info!(
        output = %output.display(),
        files_read,
        rows_written,
        skipped = skipped.len(),
        "Consolidated summary tables"
    );

    Ok(ConsolidationResult {
        output,
        files_read,
        rows_written,
        skipped,
    })
}

fn read_summary(path: &Path) -> Result<SummaryTable> {
    let text = fs::read_to_string(path).context("Failed to read summary")?;
    let table = SummaryTable::from_csv(&text)?;
    if table.key_fields != SUMMARY_KEYS {
        bail!(
            "expected key fields {}, found {}",
            SUMMARY_KEYS.join(","),
            table.key_fields.join(",")
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::TestDataRoot;

    const OREGON_1990: &str = "owner,county,count,sum,min,max,mean,std\n\
                               1,10,2,20,5,15,10.0,7.1\n\
                               2,10,0,,,,,\n";

    #[test]
    fn test_header() {
        assert_eq!(
            consolidated_header(),
            "region,year,owner,county,count,sum,min,max,mean,std"
        );
    }

    #[test]
    fn test_refuses_existing_output_without_force() {
        let data = TestDataRoot::new().unwrap();
        data.write("processed/oregon_1990_summary.csv", OREGON_1990).unwrap();
        data.write("processed/biomass_summary.csv", "old\n").unwrap();

        let config = PipelineConfig::with_data_root(data.path());
        let regions = config.select_regions(None).unwrap();

        assert!(consolidate(&config, &regions, false).is_err());
        assert_eq!(
            fs::read_to_string(data.join("processed/biomass_summary.csv")).unwrap(),
            "old\n"
        );

        let result = consolidate(&config, &regions, true).unwrap();
        assert_eq!(result.files_read, 1);
        assert_eq!(result.rows_written, 2);
        let text = fs::read_to_string(&result.output).unwrap();
        assert!(text.contains("oregon,1990,1,10,2,20,5,15,10.0,7.1\n"));
        assert!(text.contains("oregon,1990,2,10,0,,,,,\n"));
    }

    #[test]
    fn test_wrong_key_fields_are_skipped() {
        let data = TestDataRoot::new().unwrap();
        data.write(
            "processed/oregon_1991_summary.csv",
            "owner,count,sum,min,max,mean,std\n1,1,5,5,5,5.0,\n",
        )
        .unwrap();

        let config = PipelineConfig::with_data_root(data.path());
        let regions = config.select_regions(None).unwrap();
        let result = consolidate(&config, &regions, false).unwrap();

        assert_eq!(result.files_read, 0);
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].reason.contains("expected key fields"));
    }
}
