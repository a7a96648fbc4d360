//! GeoTIFF encoding with LZW compression.
//!
//! The `tiff` encoder writes stripped images, so output is organised in
//! strips of `chunk_size` rows. Tiled output is written as Zarr.

use std::io::{Seek, Write};

use biomass_common::GridSpec;
use tiff::encoder::colortype::{Gray32Float, GrayI16};
use tiff::encoder::{Compression, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

use crate::error::{RasterError, Result};
use crate::format::CellType;

fn encode_err(e: tiff::TiffError) -> RasterError {
    RasterError::Encode(e.to_string())
}

/// Encode a single-band raster. `values` already carries `nodata` in
/// every invalid cell.
pub(crate) fn encode_geotiff<W: Write + Seek>(
    writer: W,
    values: &[f32],
    spec: &GridSpec,
    cell_type: CellType,
    nodata: f64,
    rows_per_strip: u32,
) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)
        .map_err(encode_err)?
        .with_compression(Compression::Lzw);

    let (width, height) = (spec.width() as u32, spec.height() as u32);

    match cell_type {
        CellType::Int16 => {
            let data: Vec<i16> = values.iter().map(|&v| v as i16).collect();
            let mut image = encoder
                .new_image::<GrayI16>(width, height)
                .map_err(encode_err)?;
            write_geo_tags(image.encoder(), spec, nodata)?;
            image.rows_per_strip(rows_per_strip).map_err(encode_err)?;
            image.write_data(&data).map_err(encode_err)?;
        }
        CellType::Float32 => {
            let mut image = encoder
                .new_image::<Gray32Float>(width, height)
                .map_err(encode_err)?;
            write_geo_tags(image.encoder(), spec, nodata)?;
            image.rows_per_strip(rows_per_strip).map_err(encode_err)?;
            image.write_data(values).map_err(encode_err)?;
        }
    }

    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<W, K>,
    spec: &GridSpec,
    nodata: f64,
) -> Result<()> {
    if let Some(gt) = &spec.transform {
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])
            .map_err(encode_err)?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])
            .map_err(encode_err)?;
    }

    let geokeys = geokey_directory(spec.crs.as_deref());
    dir.write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(encode_err)?;

    if !nodata.is_nan() {
        let text = format!("{}", nodata);
        dir.write_tag(Tag::GdalNodata, text.as_str())
            .map_err(encode_err)?;
    }

    Ok(())
}

/// GeoKey directory declaring the raster as pixel-is-area, plus the EPSG
/// code of `crs` when it has the form `EPSG:<code>`.
pub(crate) fn geokey_directory(crs: Option<&str>) -> Vec<u16> {
    let epsg = crs.and_then(|c| {
        let (authority, code) = c.split_once(':')?;
        if !authority.eq_ignore_ascii_case("epsg") {
            return None;
        }
        code.trim().parse::<u16>().ok()
    });

    let mut keys: Vec<[u16; 4]> = Vec::with_capacity(3);
    match epsg {
        // EPSG geographic 2D codes
        Some(code @ (4000..=4999)) => {
            keys.push([1024, 0, 1, 2]);
            keys.push([1025, 0, 1, 1]);
            keys.push([2048, 0, 1, code]);
        }
        Some(code) => {
            keys.push([1024, 0, 1, 1]);
            keys.push([1025, 0, 1, 1]);
            keys.push([3072, 0, 1, code]);
        }
        None => {
            keys.push([1024, 0, 1, 1]);
            keys.push([1025, 0, 1, 1]);
        }
    }

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    for key in keys {
        directory.extend_from_slice(&key);
    }
    directory
}
