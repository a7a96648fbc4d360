//! Zarr V3 writer for tiled, compressed raster output.
//!
//! Each raster becomes a group with a chunked `values` array and a
//! `validity` array of `uint8` flags sharing the same chunk grid.

use std::path::Path;
use std::sync::Arc;

use biomass_common::GridSpec;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::config::{WriterConfig, ZarrCompression};
use crate::error::{RasterError, Result};
use crate::format::CellType;
use crate::reader::zarr::{VALIDITY_PATH, VALUES_PATH};

/// Writes rasters as Zarr V3 groups.
pub(crate) struct ZarrWriter<'a> {
    config: &'a WriterConfig,
}

impl<'a> ZarrWriter<'a> {
    pub(crate) fn new(config: &'a WriterConfig) -> Self {
        Self { config }
    }

    /// Write values (already carrying no-data in invalid cells) and the
    /// validity flags into a fresh store rooted at `dir`.
    pub(crate) fn write(
        &self,
        dir: &Path,
        values: &[f32],
        validity: &[bool],
        spec: &GridSpec,
        cell_type: CellType,
        nodata: f64,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let store = Arc::new(FilesystemStore::new(dir).map_err(RasterError::zarr)?);

        GroupBuilder::new()
            .attributes(attributes.clone())
            .build(store.clone(), "/")
            .map_err(RasterError::zarr)?
            .store_metadata()
            .map_err(RasterError::zarr)?;

        let shape = vec![spec.height() as u64, spec.width() as u64];
        let subset = ArraySubset::new_with_start_shape(vec![0, 0], shape.clone())
            .map_err(RasterError::zarr)?;

        // Values array
        let mut attrs = attributes;
        if let Some(transform) = &spec.transform {
            attrs.insert(
                "geotransform".to_string(),
                serde_json::json!(transform.to_gdal()),
            );
        }
        if let Some(crs) = &spec.crs {
            attrs.insert("crs".to_string(), serde_json::json!(crs));
        }
        if !nodata.is_nan() {
            attrs.insert("nodata".to_string(), serde_json::json!(nodata));
        }

        let (data_type, fill_value) = match cell_type {
            CellType::Int16 => (DataType::Int16, FillValue::from(nodata as i16)),
            CellType::Float32 => (DataType::Float32, FillValue::from(nodata as f32)),
        };

        let mut builder = ArrayBuilder::new(
            shape.clone(),
            data_type,
            self.chunk_grid()?,
            fill_value,
        );
        builder.attributes(attrs);
        if self.config.compression != ZarrCompression::None {
            builder.bytes_to_bytes_codecs(vec![self.create_compression_codec(cell_type.size_of())?]);
        }
        let array = builder
            .build(store.clone(), VALUES_PATH)
            .map_err(RasterError::zarr)?;
        array.store_metadata().map_err(RasterError::zarr)?;

        match cell_type {
            CellType::Int16 => {
                let data: Vec<i16> = values.iter().map(|&v| v as i16).collect();
                array
                    .store_array_subset_elements(&subset, &data)
                    .map_err(RasterError::zarr)?;
            }
            CellType::Float32 => {
                array
                    .store_array_subset_elements(&subset, values)
                    .map_err(RasterError::zarr)?;
            }
        }

        // Validity array
        let mut builder = ArrayBuilder::new(
            shape,
            DataType::UInt8,
            self.chunk_grid()?,
            FillValue::from(0u8),
        );
        if self.config.compression != ZarrCompression::None {
            builder.bytes_to_bytes_codecs(vec![self.create_compression_codec(1)?]);
        }
        let mask_array = builder
            .build(store, VALIDITY_PATH)
            .map_err(RasterError::zarr)?;
        mask_array.store_metadata().map_err(RasterError::zarr)?;

        let flags: Vec<u8> = validity.iter().map(|&v| v as u8).collect();
        mask_array
            .store_array_subset_elements(&subset, &flags)
            .map_err(RasterError::zarr)?;

        Ok(())
    }

    fn chunk_grid(&self) -> Result<zarrs::array::ChunkGrid> {
        let chunk = self.config.chunk_size as u64;
        vec![chunk, chunk]
            .try_into()
            .map_err(|e| RasterError::InvalidInput(format!("{:?}", e)))
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| RasterError::InvalidInput("invalid compression level".to_string()))?;

        let shuffle = if self.config.shuffle && typesize > 1 {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = match shuffle {
            BloscShuffleMode::NoShuffle => None,
            _ => Some(typesize),
        };

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(RasterError::InvalidInput(
                    "no compression configured".to_string(),
                ))
            }
            ZarrCompression::Lz4 | ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::Zstd | ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| RasterError::InvalidInput(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}
