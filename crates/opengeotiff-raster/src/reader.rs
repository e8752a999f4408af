//! GeoTIFF decoding into a [`RasterGrid`].

use crate::{GeoTransform, RasterError, RasterGrid, Result};
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, info};

// GeoTIFF tag IDs. Always go through `geo_tag`: the decoder files known
// IDs under their named variants, never under `Tag::Unknown`.
pub(crate) const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
pub(crate) const MODEL_TIEPOINT_TAG: u16 = 33922;
pub(crate) const MODEL_TRANSFORMATION_TAG: u16 = 34264;
pub(crate) const GEO_KEY_DIRECTORY_TAG: u16 = 34735;
pub(crate) const GDAL_NODATA_TAG: u16 = 42113;

// GeoKey IDs
pub(crate) const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
pub(crate) const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
pub(crate) const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

pub(crate) const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

pub(crate) fn geo_tag(id: u16) -> Tag {
    Tag::from_u16_exhaustive(id)
}

/// Load the first band of a GeoTIFF file.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<RasterGrid> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| RasterError::unreadable(path, e))?;
    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| RasterError::unreadable(path, e))?;

    // Whole-raster decoding; solar atlases are a few hundred MB as f32
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.intermediate_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| RasterError::unreadable(path, e))?;
    let (width, height) = (width as usize, height as usize);

    let geo_keys = read_geo_keys(&mut decoder).ok_or_else(|| {
        RasterError::unreadable(path, "missing GeoKeyDirectory; spatial reference unknown")
    })?;
    let epsg = epsg_from_geo_keys(&geo_keys)
        .ok_or_else(|| RasterError::unreadable(path, "no EPSG code in GeoKeyDirectory"))?;
    let pixel_is_point = geo_key(&geo_keys, GT_RASTER_TYPE_GEO_KEY) == Some(RASTER_PIXEL_IS_POINT);

    let transform = read_geotransform(&mut decoder, pixel_is_point)
        .ok_or_else(|| RasterError::unreadable(path, "missing geotransform tags"))?;
    let no_data = read_nodata_value(&mut decoder);

    let samples_per_pixel = decoder
        .get_tag_u32(Tag::SamplesPerPixel)
        .unwrap_or(1)
        .max(1) as usize;
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) == 2;

    let samples = decode_samples(&mut decoder).map_err(|e| RasterError::unreadable(path, e))?;
    let data = first_band(samples, width * height, samples_per_pixel, planar)
        .map_err(|reason| RasterError::unreadable(path, reason))?;

    info!(
        "Read {}x{} raster (EPSG:{}, {} band(s), no-data {:?}) from {}",
        width,
        height,
        epsg,
        samples_per_pixel,
        no_data,
        path.display()
    );

    RasterGrid::new(width, height, data, no_data, epsg, transform)
}

/// Read the GeoKeyDirectory as a flat list of `u16` entries.
fn read_geo_keys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<Vec<u16>> {
    decoder
        .get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY_TAG))
        .ok()
        .filter(|keys| keys.len() >= 4)
}

/// Look up an inline (short-valued) GeoKey.
///
/// Directory layout: a 4-entry header, then `[KeyID, TIFFTagLocation, Count, Value]`
/// per key. Only keys stored inline (location 0) are considered.
fn geo_key(keys: &[u16], id: u16) -> Option<u16> {
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|entry| entry[0] == id && entry[1] == 0)
        .map(|entry| entry[3])
}

/// Projected code wins over geographic; user-defined codes are not usable.
fn epsg_from_geo_keys(keys: &[u16]) -> Option<u16> {
    geo_key(keys, PROJECTED_CS_TYPE_GEO_KEY)
        .filter(|&c| c != 0 && c != USER_DEFINED)
        .or_else(|| {
            geo_key(keys, GEOGRAPHIC_TYPE_GEO_KEY).filter(|&c| c != 0 && c != USER_DEFINED)
        })
}

/// Read the affine transform from ModelTransformation or tiepoint + scale.
fn read_geotransform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    pixel_is_point: bool,
) -> Option<GeoTransform> {
    let transform = if let Ok(m) = decoder.get_tag_f64_vec(geo_tag(MODEL_TRANSFORMATION_TAG)) {
        if m.len() < 16 {
            return None;
        }
        // Row-major 4x4: x = m0*col + m1*row + m3, y = m4*col + m5*row + m7
        GeoTransform::new([m[3], m[0], m[1], m[7], m[4], m[5]])
    } else {
        let tiepoint = decoder
            .get_tag_f64_vec(geo_tag(MODEL_TIEPOINT_TAG))
            .ok()?;
        let scale = decoder
            .get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE_TAG))
            .ok()?;
        if tiepoint.len() < 6 || scale.len() < 2 {
            return None;
        }

        // Tiepoint format: [i, j, k, x, y, z] ties raster (i, j) to model (x, y)
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (scale_x, scale_y) = (scale[0], scale[1]);
        GeoTransform::from_origin(x - i * scale_x, y + j * scale_y, scale_x, -scale_y)
    };

    if pixel_is_point {
        // Model coordinates refer to pixel centers; shift to the corner
        let [x0, a, b, y0, d, e] = transform.coefficients();
        debug!("PixelIsPoint raster; shifting origin by half a pixel");
        return Some(GeoTransform::new([
            x0 - 0.5 * (a + b),
            a,
            b,
            y0 - 0.5 * (d + e),
            d,
            e,
        ]));
    }

    Some(transform)
}

/// Read the no-data value from the GDAL_NODATA tag.
///
/// Absent or unparseable means every pixel is valid.
fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let nodata_str = decoder
        .get_tag_ascii_string(geo_tag(GDAL_NODATA_TAG))
        .ok()?;
    let trimmed = nodata_str.trim().trim_end_matches('\0');
    if trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse().ok()
}

/// Decode every sample of the image, widened to `f64`.
fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> tiff::TiffResult<Vec<f64>> {
    let result = decoder.read_image()?;

    Ok(match result {
        DecodingResult::F64(data) => data,
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
    })
}

/// Keep only band 1 of a possibly multi-band sample buffer.
fn first_band(
    samples: Vec<f64>,
    pixels: usize,
    samples_per_pixel: usize,
    planar: bool,
) -> std::result::Result<Vec<f64>, String> {
    if samples_per_pixel == 1 || planar {
        // Planar layout stores band 1 as the first plane
        if samples.len() < pixels {
            return Err(format!(
                "expected at least {} samples, decoded {}",
                pixels,
                samples.len()
            ));
        }
        let mut samples = samples;
        samples.truncate(pixels);
        return Ok(samples);
    }

    if samples.len() != pixels * samples_per_pixel {
        return Err(format!(
            "expected {} interleaved samples, decoded {}",
            pixels * samples_per_pixel,
            samples.len()
        ));
    }
    Ok(samples.into_iter().step_by(samples_per_pixel).collect())
}
