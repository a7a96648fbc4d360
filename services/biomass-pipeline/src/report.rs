//! Run report formatting.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::consolidate::ConsolidationResult;
use crate::discovery::Inventory;
use crate::driver::PhaseReport;

/// Output format of the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

/// Reports of every phase in one invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            phases: Vec::new(),
        }
    }

    pub fn push(&mut self, phase: PhaseReport) {
        self.phases.push(phase);
    }

    pub fn has_failures(&self) -> bool {
        self.phases.iter().any(PhaseReport::has_failures)
    }

    pub fn render(&self, format: ReportFormat) -> anyhow::Result<String> {
        match format {
            ReportFormat::Table => Ok(self.format_table()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// One console table per phase.
    pub fn format_table(&self) -> String {
        self.phases
            .iter()
            .map(format_phase_table)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn format_phase_table(report: &PhaseReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![format!("Phase: {}", report.phase), String::new()]);

    table.add_row(vec!["Units:", &report.units.len().to_string()]);
    table.add_row(vec!["Skipped:", &report.skipped().to_string()]);
    table.add_row(vec!["Succeeded:", &report.succeeded().to_string()]);
    table.add_row(vec!["Failed:", &report.failed().to_string()]);
    table.add_row(vec![
        "Duration:",
        &format!("{:.1}s", report.elapsed_ms as f64 / 1000.0),
    ]);

    if report.has_failures() {
        table.add_row(vec!["", ""]);
        for (id, message) in report.failures() {
            table.add_row(vec![id, message]);
        }
    }

    table.to_string()
}

/// Consolidation summary as a console table.
pub fn format_consolidation_table(result: &ConsolidationResult) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Consolidation".to_string(), result.output.display().to_string()]);

    table.add_row(vec!["Files read:", &result.files_read.to_string()]);
    table.add_row(vec!["Rows written:", &result.rows_written.to_string()]);
    table.add_row(vec!["Files skipped:", &result.skipped.len().to_string()]);
    for skipped in &result.skipped {
        table.add_row(vec![skipped.path.display().to_string(), skipped.reason.clone()]);
    }

    table.to_string()
}

/// Discovered layers as a console table.
pub fn format_inventory_table(inventory: &Inventory) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Kind", "Region", "Year", "Path"]);

    for record in &inventory.records {
        table.add_row(vec![
            record.kind.to_string(),
            record.region.clone().unwrap_or_default(),
            record.year.map(|y| y.to_string()).unwrap_or_default(),
            record.path.display().to_string(),
        ]);
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{UnitReport, UnitState};
    use crate::phases::Phase;
    use std::path::PathBuf;

    fn report() -> RunReport {
        let mut run = RunReport::new();
        run.push(PhaseReport {
            phase: Phase::Summarize,
            units: vec![
                UnitReport {
                    id: "summarize/oregon/1990".into(),
                    output_path: PathBuf::from("processed/oregon_1990_summary.csv"),
                    state: UnitState::Skipped,
                    elapsed_ms: 0,
                },
                UnitReport {
                    id: "summarize/oregon/1991".into(),
                    output_path: PathBuf::from("processed/oregon_1991_summary.csv"),
                    state: UnitState::Failed("ownership grid mismatch".into()),
                    elapsed_ms: 12,
                },
            ],
            elapsed_ms: 1500,
        });
        run
    }

    #[test]
    fn test_table_lists_failures() {
        let text = report().format_table();
        assert!(text.contains("Phase: summarize"));
        assert!(text.contains("summarize/oregon/1991"));
        assert!(text.contains("ownership grid mismatch"));
        assert!(text.contains("1.5s"));
    }

    #[test]
    fn test_inventory_table() {
        use crate::discovery::LayerRecord;
        use biomass_common::LayerKind;

        let inventory = Inventory {
            records: vec![LayerRecord {
                kind: LayerKind::MaskedBiomass,
                region: Some("oregon".into()),
                year: Some(2003),
                path: PathBuf::from("interim/masked_biomass/oregon_biomass_2003.tif"),
            }],
        };
        let text = format_inventory_table(&inventory);
        assert!(text.contains("masked_biomass"));
        assert!(text.contains("2003"));
    }

    #[test]
    fn test_json_report() {
        let run = report();
        assert!(run.has_failures());
        let json: serde_json::Value =
            serde_json::from_str(&run.render(ReportFormat::Json).unwrap()).unwrap();
        let units = &json["phases"][0]["units"];
        assert_eq!(json["phases"][0]["phase"], "summarize");
        assert_eq!(units[0]["state"], "skipped");
        assert_eq!(units[1]["state"], "failed");
        assert_eq!(units[1]["message"], "ownership grid mismatch");
    }
}
