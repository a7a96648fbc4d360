//! On-disk raster formats and cell types.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RasterError, Result};

/// Storage format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Single-band GeoTIFF (`.tif`, `.tiff`).
    GeoTiff,
    /// Zarr V3 group with `values` and `validity` arrays (`.zarr`).
    Zarr,
}

impl RasterFormat {
    /// Detect the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "tif" | "tiff" => Ok(Self::GeoTiff),
            "zarr" => Ok(Self::Zarr),
            _ => Err(RasterError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeoTiff => "geotiff",
            Self::Zarr => "zarr",
        }
    }
}

/// Cell type used when persisting a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Int16,
    Float32,
}

impl CellType {
    /// No-data value used when a layer does not declare one.
    pub fn default_nodata(&self) -> f64 {
        match self {
            Self::Int16 => i16::MIN as f64,
            Self::Float32 => f64::NAN,
        }
    }

    /// Whether `value` is stored exactly by this cell type.
    pub fn can_represent(&self, value: f64) -> bool {
        match self {
            Self::Int16 => {
                value.fract() == 0.0 && value >= i16::MIN as f64 && value <= i16::MAX as f64
            }
            Self::Float32 => true,
        }
    }

    /// Bytes per element, used as the shuffle type size.
    pub fn size_of(&self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Float32 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Float32 => "float32",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            RasterFormat::from_path(Path::new("oregon_biomass_1990.tif")).unwrap(),
            RasterFormat::GeoTiff
        );
        assert_eq!(
            RasterFormat::from_path(Path::new("a/b/OREGON.TIFF")).unwrap(),
            RasterFormat::GeoTiff
        );
        assert_eq!(
            RasterFormat::from_path(Path::new("oregon_diff_1990-1991.zarr")).unwrap(),
            RasterFormat::Zarr
        );
        assert!(matches!(
            RasterFormat::from_path(Path::new("summary.csv")),
            Err(RasterError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_default_nodata() {
        assert_eq!(CellType::Int16.default_nodata(), -32768.0);
        assert!(CellType::Float32.default_nodata().is_nan());
    }

    #[test]
    fn test_can_represent() {
        assert!(CellType::Int16.can_represent(-32768.0));
        assert!(CellType::Int16.can_represent(255.0));
        assert!(!CellType::Int16.can_represent(65535.0));
        assert!(!CellType::Int16.can_represent(-9999.5));
        assert!(!CellType::Int16.can_represent(f64::NAN));
        assert!(CellType::Float32.can_represent(f64::NAN));
    }
}
