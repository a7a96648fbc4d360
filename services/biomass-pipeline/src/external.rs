//! External raster tools (GDAL command line utilities).
//!
//! Clipping, reprojection and rasterization are delegated to GDAL. Each
//! invocation is described by a [`ToolRequest`] and reported back as a
//! [`ToolOutcome`], so callers never inspect exit codes or stderr text.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::bail;
use biomass_common::BoundingBox;
use serde::Serialize;
use tracing::{debug, warn};

use crate::driver::WorkUnit;

/// Tile edge used for GeoTIFF creation options.
pub const BLOCK_SIZE: u32 = 256;

/// An operation to run with an external tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ToolRequest {
    /// Clip (and optionally reproject) a raster to a region grid.
    Warp {
        input: PathBuf,
        output: PathBuf,
        cutline: PathBuf,
        bounds: BoundingBox,
        resolution: f64,
        target_crs: Option<String>,
        resampling: Option<String>,
    },
    /// Burn a vector attribute into a region grid.
    Rasterize {
        input: PathBuf,
        output: PathBuf,
        bounds: BoundingBox,
        resolution: f64,
        crs: String,
        attribute: String,
        nodata: i64,
    },
}

impl ToolRequest {
    pub fn output(&self) -> &Path {
        match self {
            Self::Warp { output, .. } | Self::Rasterize { output, .. } => output,
        }
    }

    pub fn input(&self) -> &Path {
        match self {
            Self::Warp { input, .. } | Self::Rasterize { input, .. } => input,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Warp { .. } => "warp",
            Self::Rasterize { .. } => "rasterize",
        }
    }
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    pub output_path: PathBuf,
}

impl ToolOutcome {
    pub fn ok(output_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output_path: output_path.into(),
        }
    }

    pub fn failed(output_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output_path: output_path.into(),
        }
    }
}

/// Something that can carry out a [`ToolRequest`].
pub trait ExternalTool: Send + Sync {
    fn run(&self, request: &ToolRequest) -> ToolOutcome;
}

/// Runs `gdalwarp` and `gdal_rasterize` as child processes.
#[derive(Debug, Clone)]
pub struct GdalCommandTool {
    gdalwarp: String,
    gdal_rasterize: String,
}

impl Default for GdalCommandTool {
    fn default() -> Self {
        Self::new("gdalwarp", "gdal_rasterize")
    }
}

impl GdalCommandTool {
    pub fn new(gdalwarp: impl Into<String>, gdal_rasterize: impl Into<String>) -> Self {
        Self {
            gdalwarp: gdalwarp.into(),
            gdal_rasterize: gdal_rasterize.into(),
        }
    }

    /// Program and argument list for a request.
    pub fn command_line(&self, request: &ToolRequest) -> (String, Vec<String>) {
        let mut args: Vec<String> = Vec::new();
        match request {
            ToolRequest::Warp {
                input,
                output,
                cutline,
                bounds,
                resolution,
                target_crs,
                resampling,
            } => {
                args.push("-cutline".into());
                args.push(cutline.display().to_string());
                args.push("-crop_to_cutline".into());
                push_grid_args(&mut args, bounds, *resolution);
                if let Some(method) = resampling {
                    args.push("-r".into());
                    args.push(method.clone());
                }
                push_creation_options(&mut args);
                if let Some(crs) = target_crs {
                    args.push("-t_srs".into());
                    args.push(crs.clone());
                }
                args.push(input.display().to_string());
                args.push(output.display().to_string());
                (self.gdalwarp.clone(), args)
            }
            ToolRequest::Rasterize {
                input,
                output,
                bounds,
                resolution,
                crs,
                attribute,
                nodata,
            } => {
                push_grid_args(&mut args, bounds, *resolution);
                push_creation_options(&mut args);
                args.extend([
                    "-a_srs".to_string(),
                    crs.clone(),
                    "-a_nodata".to_string(),
                    nodata.to_string(),
                    "-a".to_string(),
                    attribute.clone(),
                    "-ot".to_string(),
                    "UInt32".to_string(),
                ]);
                args.push(input.display().to_string());
                args.push(output.display().to_string());
                (self.gdal_rasterize.clone(), args)
            }
        }
    }
}

fn push_grid_args(args: &mut Vec<String>, bounds: &BoundingBox, resolution: f64) {
    args.push("-te".into());
    args.extend(bounds.to_te_args());
    args.push("-tr".into());
    args.push(resolution.to_string());
    args.push(resolution.to_string());
    args.push("-tap".into());
}

fn push_creation_options(args: &mut Vec<String>) {
    for option in [
        "TILED=TRUE".to_string(),
        "COMPRESS=LZW".to_string(),
        format!("BLOCKXSIZE={}", BLOCK_SIZE),
        format!("BLOCKYSIZE={}", BLOCK_SIZE),
    ] {
        args.push("-co".into());
        args.push(option);
    }
}

impl ExternalTool for GdalCommandTool {
    fn run(&self, request: &ToolRequest) -> ToolOutcome {
        let output = request.output().to_path_buf();
        let (program, args) = self.command_line(request);

        if let Some(parent) = output.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutcome::failed(output, format!("cannot create output directory: {}", e));
            }
        }

        debug!(program = %program, args = ?args, "Running external tool");

        match Command::new(&program).args(&args).output() {
            Ok(result) if result.status.success() => {
                ToolOutcome::ok(output, format!("{} completed", program))
            }
            Ok(result) => {
                let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
                warn!(
                    program = %program,
                    status = %result.status,
                    stderr = %stderr,
                    "External tool failed"
                );
                // GDAL can leave a partial file behind on failure.
                let _ = std::fs::remove_file(&output);
                ToolOutcome::failed(output, format!("{} exited with {}: {}", program, result.status, stderr))
            }
            Err(e) => ToolOutcome::failed(output, format!("failed to launch {}: {}", program, e)),
        }
    }
}

/// Work unit running one external tool request.
pub struct PrepareUnit {
    id: String,
    request: ToolRequest,
    tool: Arc<dyn ExternalTool>,
}

impl PrepareUnit {
    pub fn new(id: impl Into<String>, request: ToolRequest, tool: Arc<dyn ExternalTool>) -> Self {
        Self {
            id: id.into(),
            request,
            tool,
        }
    }

    pub fn request(&self) -> &ToolRequest {
        &self.request
    }
}

impl WorkUnit for PrepareUnit {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn output_path(&self) -> &Path {
        self.request.output()
    }

    fn run(&self) -> anyhow::Result<()> {
        if !self.request.input().exists() {
            bail!("input not found: {}", self.request.input().display());
        }
        let outcome = self.tool.run(&self.request);
        if !outcome.success {
            bail!("{} failed: {}", self.request.name(), outcome.message);
        }
        Ok(())
    }
}
