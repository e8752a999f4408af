//! Vector output, GeoJSON or GeoPackage by file extension.
//!
//! Every feature carries the same attributes: `fid` (1-based), `min`, `max`
//! and `source`. GeoJSON collections in anything other than EPSG:4326 name
//! their reference system in a legacy `crs` member; GeoPackages register the
//! EPSG code in `gpkg_spatial_ref_sys`.
//!
//! The file is written next to its destination as `<name>.tmp` and renamed
//! into place, so readers never see a half-written dataset and a failed run
//! leaves an earlier output untouched.

use crate::boundary::DEFAULT_EPSG;
use crate::clip::ClippedFeature;
use crate::gpkg::{layer_name, write_geopackage};
use crate::{Result, VectorError};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Output encodings, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `.geojson` or `.json`
    GeoJson,
    /// `.gpkg`
    GeoPackage,
}

impl OutputFormat {
    /// Format for `path`, or `None` when the extension is not recognised.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "geojson" | "json" => Some(OutputFormat::GeoJson),
            "gpkg" => Some(OutputFormat::GeoPackage),
            _ => None,
        }
    }
}

/// Whether `path` names an output format this writer produces.
pub fn is_supported_output<P: AsRef<Path>>(path: P) -> bool {
    OutputFormat::from_path(path).is_some()
}

/// Write `features` in `epsg` to `path`, encoded according to its extension.
///
/// An empty slice still produces a valid, empty dataset.
pub fn write_features<P: AsRef<Path>>(features: &[ClippedFeature], epsg: u16, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = OutputFormat::from_path(path).ok_or_else(|| {
        VectorError::write(
            path,
            "unsupported output format, expected .geojson, .json or .gpkg",
        )
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| VectorError::write(path, e))?;
    }

    let tmp = temp_path(path);
    // A stale temp file would be reopened as an existing GeoPackage
    let _ = fs::remove_file(&tmp);
    let written = match format {
        OutputFormat::GeoJson => {
            write_geojson(&tmp, &feature_collection(features, epsg)).map_err(|e| e.to_string())
        }
        OutputFormat::GeoPackage => {
            write_geopackage(&tmp, &layer_name(path), features, epsg).map_err(|e| e.to_string())
        }
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(VectorError::write(path, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(VectorError::write(path, e));
    }

    info!(
        "Wrote {} feature(s) to {} ({:?})",
        features.len(),
        path.display(),
        format
    );
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_geojson(path: &Path, geojson: &GeoJson) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, geojson)?;
    writer.write_all(b"\n")?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    debug!("Flushed {}", path.display());
    Ok(())
}

fn feature_collection(features: &[ClippedFeature], epsg: u16) -> GeoJson {
    let features = features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let fid = i as u64 + 1;
            let mut properties = JsonObject::new();
            properties.insert("fid".to_string(), json!(fid));
            properties.insert("min".to_string(), json!(feature.attributes.min));
            properties.insert("max".to_string(), json!(feature.attributes.max));
            properties.insert("source".to_string(), json!(feature.attributes.source));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&feature.polygon))),
                id: Some(Id::Number(fid.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = (epsg != DEFAULT_EPSG).then(|| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({
                "type": "name",
                "properties": {"name": format!("urn:ogc:def:crs:EPSG::{}", epsg)},
            }),
        );
        members
    });

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    })
}
