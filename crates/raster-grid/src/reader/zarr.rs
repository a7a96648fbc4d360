//! Zarr V3 raster reading.
//!
//! Layout written by [`crate::writer`]: a group at the store root holding
//! a `values` array (`[rows, cols]`) and an optional `validity` array of
//! `uint8` flags. Grid metadata lives in the `values` array attributes.

use std::path::Path;
use std::sync::Arc;

use biomass_common::{GeoTransform, GridSpec};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use super::to_f32;
use crate::error::{RasterError, Result};
use crate::layer::{embedded_validity, RasterLayer};

pub(crate) const VALUES_PATH: &str = "/values";
pub(crate) const VALIDITY_PATH: &str = "/validity";

/// Read a Zarr raster into a [`RasterLayer`].
pub fn read_zarr(path: &Path) -> Result<RasterLayer> {
    let store = Arc::new(
        FilesystemStore::new(path)
            .map_err(|e| RasterError::source_unavailable(path, e.to_string()))?,
    );

    let values_array = Array::open(store.clone(), VALUES_PATH)
        .map_err(|e| RasterError::source_unavailable(path, e.to_string()))?;

    let spec = extract_spec(&values_array)?;
    let values = retrieve_as_f32(&values_array)?;

    let mut validity = embedded_validity(&values, spec.nodata);
    if let Ok(validity_array) = Array::open(store, VALIDITY_PATH) {
        let flags = retrieve_flags(&validity_array)?;
        if flags.len() != validity.len() {
            return Err(RasterError::grid_mismatch(format!(
                "validity array has {} cells, values array has {}",
                flags.len(),
                validity.len()
            )));
        }
        for (valid, flag) in validity.iter_mut().zip(flags) {
            *valid &= flag != 0;
        }
    }

    RasterLayer::new(spec, values, validity)
}

/// Grid metadata from array shape and attributes.
fn extract_spec(array: &Array<FilesystemStore>) -> Result<GridSpec> {
    let shape = array.shape();
    if shape.len() != 2 {
        return Err(RasterError::InvalidInput(format!(
            "expected a 2-D array, found {} dimensions",
            shape.len()
        )));
    }

    // Zarr is [rows, cols]
    let mut spec = GridSpec::new(shape[1] as usize, shape[0] as usize);
    let attrs = array.attributes();

    spec.transform = attrs
        .get("geotransform")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            if arr.len() != 6 {
                return None;
            }
            let mut gt = [0.0f64; 6];
            for (slot, v) in gt.iter_mut().zip(arr) {
                *slot = v.as_f64()?;
            }
            Some(GeoTransform::from_gdal(gt))
        });

    spec.crs = attrs
        .get("crs")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    spec.nodata = attrs.get("nodata").and_then(|v| v.as_f64());

    Ok(spec)
}

/// Subset covering the whole array.
fn full_subset(array: &Array<FilesystemStore>) -> Result<ArraySubset> {
    let shape = array.shape().to_vec();
    ArraySubset::new_with_start_shape(vec![0; shape.len()], shape).map_err(RasterError::zarr)
}

fn retrieve_flags(array: &Array<FilesystemStore>) -> Result<Vec<u8>> {
    let subset = full_subset(array)?;
    array
        .retrieve_array_subset_elements::<u8>(&subset)
        .map_err(RasterError::zarr)
}

fn retrieve_as_f32(array: &Array<FilesystemStore>) -> Result<Vec<f32>> {
    let subset = full_subset(array)?;

    macro_rules! retrieve {
        ($ty:ty) => {
            array
                .retrieve_array_subset_elements::<$ty>(&subset)
                .map_err(RasterError::zarr)
        };
    }

    match array.data_type() {
        DataType::Float32 => retrieve!(f32),
        DataType::Float64 => retrieve!(f64).map(to_f32),
        DataType::Int8 => retrieve!(i8).map(to_f32),
        DataType::Int16 => retrieve!(i16).map(to_f32),
        DataType::Int32 => retrieve!(i32).map(to_f32),
        DataType::UInt8 => retrieve!(u8).map(to_f32),
        DataType::UInt16 => retrieve!(u16).map(to_f32),
        DataType::UInt32 => retrieve!(u32).map(to_f32),
        other => Err(RasterError::UnsupportedFormat(format!(
            "unsupported Zarr data type {:?}",
            other
        ))),
    }
}
