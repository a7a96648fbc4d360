//! Discovery of existing layers under the data root.
//!
//! Every file (and every `.zarr` directory) below the data root is matched
//! against the configured path templates. A match yields the layer kind
//! together with the region and year the template captured.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use biomass_common::LayerKind;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::PipelineConfig;

/// A layer found on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LayerRecord {
    pub kind: LayerKind,
    pub region: Option<String>,
    /// Year of an annual layer, or the earlier year of a difference.
    pub year: Option<u16>,
    pub path: PathBuf,
}

/// Result of scanning the data root.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub records: Vec<LayerRecord>,
}

impl Inventory {
    pub fn of_kind(&self, kind: LayerKind) -> impl Iterator<Item = &LayerRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    /// Sorted, distinct years of a region's layers of one kind.
    pub fn years(&self, kind: LayerKind, region: &str) -> Vec<u16> {
        self.of_kind(kind)
            .filter(|r| r.region.as_deref() == Some(region))
            .filter_map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted, distinct years of region-independent layers of one kind.
    pub fn shared_years(&self, kind: LayerKind) -> Vec<u16> {
        self.of_kind(kind)
            .filter(|r| r.region.is_none())
            .filter_map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Scan `config.data_root` for layers of every known kind.
///
/// Records of regions that are not configured are dropped. A missing data
/// root yields an empty inventory.
pub fn discover(config: &PipelineConfig) -> Result<Inventory> {
    let root = &config.data_root;
    if !root.exists() {
        info!(root = %root.display(), "Data root does not exist, nothing discovered");
        return Ok(Inventory::default());
    }

    let regions: BTreeSet<&str> = config.regions.iter().map(|r| r.name()).collect();
    let mut records = Vec::new();

    let mut walker = WalkDir::new(root).follow_links(true).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
        let path = entry.path();

        let is_zarr = entry.file_type().is_dir() && has_extension(path, "zarr");
        if entry.file_type().is_dir() {
            if is_zarr {
                walker.skip_current_dir();
            } else {
                continue;
            }
        }
        if is_partial(path) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        for kind in LayerKind::ALL {
            let Some(vars) = config.paths.get(kind).match_path(&relative) else {
                continue;
            };
            if let Some(region) = &vars.region {
                if !regions.contains(region.as_str()) {
                    continue;
                }
            }
            records.push(LayerRecord {
                kind,
                region: vars.region,
                year: vars.year.or(vars.year1),
                path: path.to_path_buf(),
            });
        }
    }

    records.sort();
    debug!(root = %root.display(), records = records.len(), "Discovered layers");

    Ok(Inventory { records })
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Temporary siblings of in-progress writes.
fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(".partial-"))
}
