//! End-to-end pipeline runs over generated rasters and boundaries.

use approx::assert_relative_eq;
use geo::Area;
use opengeotiff_raster::fixtures::GeoTiffFixture;
use opengeotiff_runner::{ErrorKind, MaskRange, Pipeline, PipelineConfig, Stage};
use opengeotiff_vector::Boundary;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// The 4x4 raster of Scenario A: 500/1500 checkerboard in 2x1 blocks.
fn write_checkerboard(path: &Path) {
    GeoTiffFixture::from_rows(
        &[
            &[500.0, 1500.0, 500.0, 1500.0],
            &[500.0, 1500.0, 500.0, 1500.0],
            &[1500.0, 500.0, 1500.0, 500.0],
            &[1500.0, 500.0, 1500.0, 500.0],
        ],
        (0.0, 4.0),
        (1.0, 1.0),
    )
    .write(path)
    .unwrap();
}

fn write_box(path: &Path, x0: f64, y0: f64, x1: f64, y1: f64) {
    let text = format!(
        r#"{{"type": "FeatureCollection", "features": [{{"type": "Feature", "properties": {{}},
            "geometry": {{"type": "Polygon", "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]]}}}}]}}"#
    );
    fs::write(path, text).unwrap();
}

fn config(dir: &Path, source: String, min: f64, max: f64) -> PipelineConfig {
    PipelineConfig {
        source,
        cache_dir: dir.join("cache"),
        clipping: dir.join("boundary.geojson").display().to_string(),
        output: dir.join("out").join("result.geojson"),
        mask: MaskRange { min, max },
        simplify: None,
    }
}

fn read_output(path: &Path) -> Vec<Value> {
    let json: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["type"], "FeatureCollection");
    json["features"].as_array().unwrap().clone()
}

/// Total area of the written features, read back through the boundary loader.
fn output_area(path: &Path) -> f64 {
    Boundary::load(path).unwrap().geometry().unsigned_area()
}

#[test]
fn test_scenario_a_full_extent() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 4.0, 4.0);

    let cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    let mut pipeline = Pipeline::new(cfg.clone());
    let summary = pipeline.run().unwrap();

    assert_eq!(pipeline.stage(), Stage::Done);
    assert_eq!(summary.masked_cells, 8);
    assert_eq!(summary.polygon_count, 1);
    assert_eq!(summary.feature_count, 1);
    assert_eq!(summary.epsg, 4326);

    let features = read_output(&cfg.output);
    assert_eq!(features.len(), 1);
    let props = &features[0]["properties"];
    assert_eq!(props["fid"], 1);
    assert_eq!(props["min"], 0.0);
    assert_eq!(props["max"], 1000.0);
    assert_eq!(props["source"], raster.display().to_string());
    assert_relative_eq!(output_area(&cfg.output), 8.0, epsilon = 1e-9);
}

#[test]
fn test_scenario_b_left_half() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 2.0, 4.0);

    let cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    let summary = Pipeline::new(cfg.clone()).run().unwrap();

    assert!(summary.feature_count >= 1);
    assert_relative_eq!(output_area(&cfg.output), 4.0, epsilon = 1e-9);

    let boundary = Boundary::load(&cfg.output).unwrap();
    for polygon in boundary.geometry() {
        for c in polygon.exterior().coords() {
            assert!(c.x >= 0.0 && c.x <= 2.0, "vertex outside left half: {:?}", c);
        }
    }
}

#[test]
fn test_scenario_c_inverted_range() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 4.0, 4.0);

    let cfg = config(dir.path(), raster.display().to_string(), 1000.0, 0.0);
    let mut pipeline = Pipeline::new(cfg.clone());
    let err = pipeline.run().unwrap_err();

    assert_eq!(err.stage, Stage::Masking);
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert!(!cfg.output.exists());
}

#[test]
fn test_scenario_d_unreachable_source() {
    let dir = tempfile::tempdir().unwrap();
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 4.0, 4.0);

    let cfg = config(
        dir.path(),
        "http://127.0.0.1:9/solar/GHI.tif".to_string(),
        0.0,
        1000.0,
    );
    let err = Pipeline::new(cfg.clone()).run().unwrap_err();

    assert_eq!(err.stage, Stage::Fetching);
    assert_eq!(err.kind(), ErrorKind::Fetch);
    assert!(cfg.cache_dir.is_dir());
    let rasters = fs::read_dir(&cfg.cache_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tif"))
        .count();
    assert_eq!(rasters, 0);
    assert!(!cfg.output.exists());
}

#[test]
fn test_scenario_e_no_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 50.0, 50.0, 51.0, 51.0);

    let cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    let summary = Pipeline::new(cfg.clone()).run().unwrap();

    assert_eq!(summary.feature_count, 0);
    assert!(cfg.output.is_file());
    assert!(read_output(&cfg.output).is_empty());
}

#[test]
fn test_archive_source_with_member_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    let bytes = fs::read(&raster).unwrap();

    let archive = dir.path().join("atlas.zip");
    let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
    for name in ["data/GHI.tif", "data/DNI_large_name.tif"] {
        zip.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.finish().unwrap();
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 4.0, 4.0);

    let cfg = config(dir.path(), format!("{}#ghi", archive.display()), 0.0, 1000.0);
    let summary = Pipeline::new(cfg).run().unwrap();
    assert!(summary.raster.ends_with("data/GHI.tif"), "{}", summary.raster.display());
    assert_eq!(summary.feature_count, 1);
}

#[test]
fn test_missing_boundary_fails_at_clipping() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);

    let cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    let err = Pipeline::new(cfg.clone()).run().unwrap_err();
    assert_eq!(err.stage, Stage::Clipping);
    assert_eq!(err.kind(), ErrorKind::GeometryLoad);
    assert!(!cfg.output.exists());
}

#[test]
fn test_unreadable_raster_fails_at_reading() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    fs::write(&raster, b"not a tiff").unwrap();

    let cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    let err = Pipeline::new(cfg).run().unwrap_err();
    assert_eq!(err.stage, Stage::Reading);
    assert_eq!(err.kind(), ErrorKind::UnreadableRaster);
}

#[test]
fn test_unsupported_output_fails_at_writing() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 4.0, 4.0);

    let mut cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    cfg.output = dir.path().join("result.shp");
    let err = Pipeline::new(cfg.clone()).run().unwrap_err();
    assert_eq!(err.stage, Stage::Writing);
    assert_eq!(err.kind(), ErrorKind::Write);
    assert!(!cfg.output.exists());
}

#[test]
fn test_geopackage_output() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 2.0, 4.0);

    let mut cfg = config(dir.path(), raster.display().to_string(), 0.0, 1000.0);
    cfg.output = dir.path().join("out").join("ghi_low.gpkg");
    let summary = Pipeline::new(cfg.clone()).run().unwrap();
    assert!(summary.feature_count >= 1);

    let conn = rusqlite::Connection::open(&cfg.output).unwrap();
    let (count, min, max, source): (i64, f64, f64, String) = conn
        .query_row(
            "SELECT COUNT(*), MIN(min), MAX(max), MIN(source) FROM ghi_low",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(count as usize, summary.feature_count);
    assert_eq!((min, max), (0.0, 1000.0));
    assert_eq!(source, raster.display().to_string());

    let (min_x, max_x): (f64, f64) = conn
        .query_row(
            "SELECT min_x, max_x FROM gpkg_contents WHERE table_name = 'ghi_low'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert!(min_x >= 0.0 && max_x <= 2.0, "extent {}..{}", min_x, max_x);
}

#[test]
fn test_config_file_drives_run() {
    let dir = tempfile::tempdir().unwrap();
    let raster = dir.path().join("grid.tif");
    write_checkerboard(&raster);
    write_box(&dir.path().join("boundary.geojson"), 0.0, 0.0, 4.0, 4.0);

    let yaml = format!(
        "source: '{}'\ncache_dir: '{}'\nclipping: '{}'\noutput: '{}'\nmask:\n  min: 1000\n  max: 2000\nsimplify: 0.1\n",
        raster.display(),
        dir.path().join("cache").display(),
        dir.path().join("boundary.geojson").display(),
        dir.path().join("high.json").display(),
    );
    let config_path = dir.path().join("config.yml");
    fs::write(&config_path, yaml).unwrap();

    let cfg = PipelineConfig::from_file(&config_path).unwrap();
    assert_eq!(cfg.simplify, Some(0.1));
    let summary = Pipeline::new(cfg).run().unwrap();

    assert_eq!(summary.masked_cells, 8);
    assert_relative_eq!(output_area(&summary.output), 8.0, epsilon = 1e-9);
}
