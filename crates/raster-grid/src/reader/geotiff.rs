//! Native GeoTIFF reading (no GDAL dependency).
//!
//! Reads the first image of a single-band TIFF, with georeferencing from
//! the ModelPixelScale/ModelTiepoint tags, the CRS from the GeoKey
//! directory, and no-data from the GDAL_NODATA tag.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use biomass_common::{GeoTransform, GridSpec};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use super::to_f32;
use crate::error::{RasterError, Result};
use crate::layer::RasterLayer;

const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
/// GeoKey value meaning "user defined" rather than an EPSG code.
const USER_DEFINED: u16 = 32767;

/// Read a single-band GeoTIFF into a [`RasterLayer`].
pub fn read_geotiff(path: &Path) -> Result<RasterLayer> {
    let file = File::open(path)
        .map_err(|e| RasterError::source_unavailable(path, e.to_string()))?;
    decode_geotiff(BufReader::new(file))
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<RasterLayer> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => {
            return Err(RasterError::UnsupportedFormat(format!(
                "expected a single-band raster, found {:?}",
                other
            )))
        }
    }

    let (width, height) = decoder.dimensions()?;
    let mut spec = GridSpec::new(width as usize, height as usize);

    if let Some(transform) = read_geotransform(&mut decoder) {
        spec.transform = Some(transform);
    }
    spec.crs = read_epsg(&mut decoder).map(|code| format!("EPSG:{}", code));
    spec.nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    let values = match decoder.read_image()? {
        DecodingResult::U8(buf) => to_f32(buf),
        DecodingResult::U16(buf) => to_f32(buf),
        DecodingResult::U32(buf) => to_f32(buf),
        DecodingResult::U64(buf) => to_f32(buf),
        DecodingResult::I8(buf) => to_f32(buf),
        DecodingResult::I16(buf) => to_f32(buf),
        DecodingResult::I32(buf) => to_f32(buf),
        DecodingResult::I64(buf) => to_f32(buf),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => to_f32(buf),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RasterError::UnsupportedFormat(
                "unsupported TIFF sample format".to_string(),
            ))
        }
    };

    RasterLayer::from_values(spec, values)
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, if both are present.
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code of the projected or geographic CRS declared in the GeoKey
/// directory. Only keys stored inline (TIFFTagLocation 0) are considered.
fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u16> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    parse_epsg(&keys)
}

pub(crate) fn parse_epsg(keys: &[u16]) -> Option<u16> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    let entries = keys[4..].chunks_exact(4).take(count);

    let mut geographic = None;
    for entry in entries {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE_GEO_KEY => return Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }
    geographic
}
