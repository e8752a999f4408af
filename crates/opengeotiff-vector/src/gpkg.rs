//! GeoPackage output.
//!
//! One feature table per file, named after the output file stem, with a
//! `geom` POLYGON column stored as GeoPackage binary (header + WKB) and the
//! same `min`, `max`, `source` attributes as the GeoJSON output. `fid` is the
//! 1-based integer primary key.

use crate::boundary::DEFAULT_EPSG;
use crate::clip::ClippedFeature;
use geo::{BoundingRect, Geometry, Rect};
use geozero::{CoordDimensions, ToWkb};
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// `GPKG` in ASCII.
const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.3.0.
const GPKG_USER_VERSION: i32 = 10300;

const SCHEMA: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
";

#[derive(Debug, Error)]
pub(crate) enum GpkgError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("geometry encoding failed: {0}")]
    Geometry(#[from] geozero::error::GeozeroError),
}

/// Write `features` to a new GeoPackage at `path`, which must not exist yet.
pub(crate) fn write_geopackage(
    path: &Path,
    layer: &str,
    features: &[ClippedFeature],
    epsg: u16,
) -> Result<(), GpkgError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "PRAGMA application_id = {GPKG_APPLICATION_ID}; PRAGMA user_version = {GPKG_USER_VERSION};"
    ))?;

    let srs_id = i32::from(epsg);
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;

    // EPSG:4326 is mandatory in every GeoPackage
    for code in [DEFAULT_EPSG, epsg] {
        let definition = crs_definitions::from_code(code).map_or("undefined", |def| def.wkt);
        tx.execute(
            "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, ?3, NULL)",
            params![format!("EPSG:{code}"), i32::from(code), definition],
        )?;
    }

    let extent = extent(features);
    tx.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, 'features', ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            layer,
            extent.map(|r| r.min().x),
            extent.map(|r| r.min().y),
            extent.map(|r| r.max().x),
            extent.map(|r| r.max().y),
            srs_id
        ],
    )?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns VALUES (?1, 'geom', 'POLYGON', ?2, 0, 0)",
        params![layer, srs_id],
    )?;
    tx.execute_batch(&format!(
        "CREATE TABLE \"{layer}\" (
            fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            geom POLYGON,
            min DOUBLE,
            max DOUBLE,
            source TEXT
        );"
    ))?;

    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO \"{layer}\" (fid, geom, min, max, source) VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?;
        for (i, feature) in features.iter().enumerate() {
            let envelope = feature
                .polygon
                .bounding_rect()
                .map(|r| vec![r.min().x, r.max().x, r.min().y, r.max().y])
                .unwrap_or_default();
            let blob = Geometry::Polygon(feature.polygon.clone()).to_gpkg_wkb(
                CoordDimensions::xy(),
                Some(srs_id),
                envelope,
            )?;
            insert.execute(params![
                i as i64 + 1,
                blob,
                feature.attributes.min,
                feature.attributes.max,
                feature.attributes.source
            ])?;
        }
    }

    tx.commit()?;
    debug!("Committed {} feature(s) to layer {}", features.len(), layer);
    Ok(())
}

/// Layer name derived from the output file stem, restricted to `[A-Za-z0-9_]`.
pub(crate) fn layer_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() {
        "mask".to_string()
    } else {
        name
    }
}

fn extent(features: &[ClippedFeature]) -> Option<Rect<f64>> {
    features
        .iter()
        .filter_map(|f| f.polygon.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}
