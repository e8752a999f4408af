//! Minimal float GeoTIFF writer for test suites.
//!
//! Writes exactly the tags [`read_raster`](crate::read_raster) understands.
//! Only compiled with the `fixtures` feature.

use crate::reader::{
    geo_tag, GDAL_NODATA_TAG, GEOGRAPHIC_TYPE_GEO_KEY, GEO_KEY_DIRECTORY_TAG,
    GT_RASTER_TYPE_GEO_KEY, MODEL_PIXEL_SCALE_TAG, MODEL_TIEPOINT_TAG, MODEL_TRANSFORMATION_TAG,
    PROJECTED_CS_TYPE_GEO_KEY, RASTER_PIXEL_IS_POINT,
};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tiff::encoder::colortype::{ColorType, Gray32Float, RGB32Float};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// How the fixture ties pixels to world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Georeference {
    /// ModelTiepoint at pixel (0, 0) plus ModelPixelScale. `origin` is the
    /// upper-left corner, `pixel_size` is positive on both axes.
    Tiepoint {
        origin: (f64, f64),
        pixel_size: (f64, f64),
    },
    /// Row-major 4x4 ModelTransformation matrix.
    Transformation([f64; 16]),
}

/// Description of a float GeoTIFF to write.
#[derive(Debug, Clone)]
pub struct GeoTiffFixture {
    /// Row-major samples, pixel-interleaved when `bands > 1`.
    pub data: Vec<f32>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Samples per pixel: 1 (gray) or 3 (RGB).
    pub bands: u16,
    pub georeference: Georeference,
    /// Write GTRasterTypeGeoKey = PixelIsPoint instead of PixelIsArea.
    pub pixel_is_point: bool,
    /// EPSG code, or `None` to omit the GeoKeyDirectory.
    pub epsg: Option<u16>,
    /// GDAL_NODATA value as written in the tag.
    pub no_data: Option<String>,
}

impl GeoTiffFixture {
    /// Single-band fixture for a grid given as rows, EPSG:4326, no no-data tag.
    pub fn from_rows(rows: &[&[f32]], origin: (f64, f64), pixel_size: (f64, f64)) -> Self {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |r| r.len()) as u32;
        Self {
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
            width,
            height,
            bands: 1,
            georeference: Georeference::Tiepoint { origin, pixel_size },
            pixel_is_point: false,
            epsg: Some(4326),
            no_data: None,
        }
    }

    /// Constant-valued single-band fixture with unit pixels.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            data: vec![value; (width * height) as usize],
            width,
            height,
            bands: 1,
            georeference: Georeference::Tiepoint {
                origin: (0.0, height as f64),
                pixel_size: (1.0, 1.0),
            },
            pixel_is_point: false,
            epsg: Some(4326),
            no_data: None,
        }
    }

    /// Set the EPSG code.
    pub fn with_epsg(mut self, epsg: Option<u16>) -> Self {
        self.epsg = epsg;
        self
    }

    /// Set the GDAL_NODATA tag text.
    pub fn with_no_data(mut self, no_data: &str) -> Self {
        self.no_data = Some(no_data.to_string());
        self
    }

    /// Georeference through a ModelTransformation matrix.
    pub fn with_transformation(mut self, matrix: [f64; 16]) -> Self {
        self.georeference = Georeference::Transformation(matrix);
        self
    }

    /// Mark the model coordinates as pixel centers.
    pub fn with_pixel_is_point(mut self) -> Self {
        self.pixel_is_point = true;
        self
    }

    /// Replace the samples with pixel-interleaved RGB data.
    pub fn with_rgb(mut self, data: Vec<f32>) -> Self {
        self.bands = 3;
        self.data = data;
        self
    }

    /// Write the fixture to `path`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> tiff::TiffResult<()> {
        let mut file = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(&mut file)?;
        match self.bands {
            3 => self.write_image::<_, RGB32Float>(&mut encoder),
            _ => self.write_image::<_, Gray32Float>(&mut encoder),
        }
    }

    fn write_image<W, C>(&self, encoder: &mut TiffEncoder<W>) -> tiff::TiffResult<()>
    where
        W: Write + Seek,
        C: ColorType<Inner = f32>,
    {
        let mut image = encoder.new_image::<C>(self.width, self.height)?;
        self.write_geo_tags(image.encoder())?;
        image.write_data(self.data.as_slice())
    }

    fn write_geo_tags<W: Write + Seek, K: TiffKind>(
        &self,
        dir: &mut DirectoryEncoder<'_, W, K>,
    ) -> tiff::TiffResult<()> {
        match &self.georeference {
            Georeference::Tiepoint { origin, pixel_size } => {
                let scale = [pixel_size.0, pixel_size.1, 0.0];
                dir.write_tag(geo_tag(MODEL_PIXEL_SCALE_TAG), scale.as_slice())?;
                let tiepoint = [0.0, 0.0, 0.0, origin.0, origin.1, 0.0];
                dir.write_tag(geo_tag(MODEL_TIEPOINT_TAG), tiepoint.as_slice())?;
            }
            Georeference::Transformation(matrix) => {
                dir.write_tag(geo_tag(MODEL_TRANSFORMATION_TAG), matrix.as_slice())?;
            }
        }

        if let Some(epsg) = self.epsg {
            let geographic = (4000..5000).contains(&epsg);
            let (model_type, crs_key) = if geographic {
                (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
            } else {
                (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
            };
            let raster_type = if self.pixel_is_point {
                RASTER_PIXEL_IS_POINT
            } else {
                RASTER_PIXEL_IS_AREA
            };
            #[rustfmt::skip]
            let keys: [u16; 16] = [
                1, 1, 0, 3,
                GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type,
                GT_RASTER_TYPE_GEO_KEY, 0, 1, raster_type,
                crs_key, 0, 1, epsg,
            ];
            dir.write_tag(geo_tag(GEO_KEY_DIRECTORY_TAG), keys.as_slice())?;
        }

        if let Some(no_data) = &self.no_data {
            dir.write_tag(geo_tag(GDAL_NODATA_TAG), no_data.as_str())?;
        }
        Ok(())
    }
}
