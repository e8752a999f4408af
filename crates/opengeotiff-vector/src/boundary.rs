//! Clipping boundary loaded from GeoJSON.
//!
//! Accepts a `FeatureCollection`, a single `Feature` or a bare geometry.
//! Polygon and MultiPolygon geometries (also inside GeometryCollections) are
//! gathered into one multipolygon; other geometry types are skipped with a
//! warning.
//!
//! Coordinates are EPSG:4326 unless the document carries the legacy `crs`
//! member (`{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32633"}}`).

use crate::reproject::Reprojector;
use crate::{Result, VectorError};
use geo::{BoundingRect, MultiPolygon, Polygon, Rect};
use geojson::{GeoJson, Geometry, JsonObject, Value};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Reference system of GeoJSON without a `crs` member.
pub const DEFAULT_EPSG: u16 = 4326;

/// Polygonal clipping area with its reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    geometry: MultiPolygon<f64>,
    epsg: u16,
}

impl Boundary {
    /// Wrap an existing geometry.
    pub fn new(geometry: MultiPolygon<f64>, epsg: u16) -> Self {
        Self { geometry, epsg }
    }

    /// Read a boundary from a GeoJSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| VectorError::geometry_load(&origin, e))?;
        Self::from_geojson_str(&text, &origin)
    }

    /// Parse a boundary from GeoJSON text. `origin` names the source in errors.
    pub fn from_geojson_str(text: &str, origin: &str) -> Result<Self> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| VectorError::geometry_load(origin, e))?;

        let mut polygons = Vec::new();
        let crs = match &geojson {
            GeoJson::FeatureCollection(fc) => {
                for feature in &fc.features {
                    if let Some(geometry) = &feature.geometry {
                        collect_polygons(geometry, origin, &mut polygons)?;
                    }
                }
                crs_member(fc.foreign_members.as_ref())
            }
            GeoJson::Feature(feature) => {
                if let Some(geometry) = &feature.geometry {
                    collect_polygons(geometry, origin, &mut polygons)?;
                }
                crs_member(feature.foreign_members.as_ref())
            }
            GeoJson::Geometry(geometry) => {
                collect_polygons(geometry, origin, &mut polygons)?;
                crs_member(geometry.foreign_members.as_ref())
            }
        };

        let epsg = match crs {
            Some(crs) => epsg_from_crs(crs).map_err(|e| VectorError::geometry_load(origin, e))?,
            None => DEFAULT_EPSG,
        };

        if polygons.is_empty() {
            return Err(VectorError::geometry_load(
                origin,
                "no Polygon or MultiPolygon geometry found",
            ));
        }

        debug!(
            "Loaded boundary {} with {} polygon(s) in EPSG:{}",
            origin,
            polygons.len(),
            epsg
        );
        Ok(Self::new(MultiPolygon::new(polygons), epsg))
    }

    /// The boundary polygons.
    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// EPSG code of the coordinates.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// Bounding rectangle of all polygons.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    /// The same boundary expressed in `target`.
    pub fn to_epsg(&self, target: u16) -> Result<Boundary> {
        let reprojector = Reprojector::new(self.epsg, target)?;
        if reprojector.is_identity() {
            return Ok(self.clone());
        }
        debug!("Reprojecting boundary from EPSG:{} to EPSG:{}", self.epsg, target);
        Ok(Self::new(reprojector.multi_polygon(&self.geometry)?, target))
    }
}

fn crs_member(members: Option<&JsonObject>) -> Option<&JsonValue> {
    members.and_then(|m| m.get("crs"))
}

fn epsg_from_crs(crs: &JsonValue) -> std::result::Result<u16, String> {
    let name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(JsonValue::as_str)
        .ok_or_else(|| "crs member has no properties.name".to_string())?;
    parse_crs_name(name).ok_or_else(|| format!("unrecognised crs name '{}'", name))
}

/// EPSG code named by a legacy GeoJSON crs name.
///
/// Understands `urn:ogc:def:crs:EPSG::N`, `EPSG:N`, the OGC
/// `.../def/crs/EPSG/0/N` form, and the CRS84 names (mapped to 4326).
pub fn parse_crs_name(name: &str) -> Option<u16> {
    if name.to_ascii_uppercase().contains("CRS84") {
        return Some(DEFAULT_EPSG);
    }
    name.rsplit([':', '/'])
        .next()
        .and_then(|code| code.trim().parse::<u16>().ok())
        .filter(|&code| code != 0)
}

fn collect_polygons(geometry: &Geometry, origin: &str, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match &geometry.value {
        Value::Polygon(rings) => {
            check_rings(rings, origin)?;
            let polygon = Polygon::<f64>::try_from(&geometry.value)
                .map_err(|e| VectorError::geometry_load(origin, e))?;
            out.push(polygon);
        }
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                check_rings(rings, origin)?;
            }
            let multi = MultiPolygon::<f64>::try_from(&geometry.value)
                .map_err(|e| VectorError::geometry_load(origin, e))?;
            out.extend(multi);
        }
        Value::GeometryCollection(members) => {
            for member in members {
                collect_polygons(member, origin, out)?;
            }
        }
        _ => warn!("Ignoring non-polygonal geometry in boundary {}", origin),
    }
    Ok(())
}

/// Rings need an exterior, four or more positions each, and finite x/y.
fn check_rings(rings: &geojson::PolygonType, origin: &str) -> Result<()> {
    if rings.is_empty() {
        return Err(VectorError::geometry_load(origin, "polygon without rings"));
    }
    for ring in rings {
        if ring.len() < 4 {
            return Err(VectorError::geometry_load(
                origin,
                format!("ring with {} positions, at least 4 required", ring.len()),
            ));
        }
        if let Some(p) = ring
            .iter()
            .find(|p| p.len() < 2 || !p[0].is_finite() || !p[1].is_finite())
        {
            return Err(VectorError::geometry_load(origin, format!("invalid position {:?}", p)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Area;

    const SQUARE: &str = r#"{"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#;

    #[test]
    fn test_bare_geometry_defaults_to_wgs84() {
        let b = Boundary::from_geojson_str(SQUARE, "square").unwrap();
        assert_eq!(b.epsg(), 4326);
        assert_eq!(b.geometry().0.len(), 1);
        assert_relative_eq!(b.geometry().unsigned_area(), 4.0);
    }

    #[test]
    fn test_feature_collection_with_crs() {
        let text = format!(
            r#"{{
                "type": "FeatureCollection",
                "crs": {{"type": "name", "properties": {{"name": "urn:ogc:def:crs:EPSG::32633"}}}},
                "features": [
                    {{"type": "Feature", "properties": {{}}, "geometry": {}}},
                    {{"type": "Feature", "properties": {{}}, "geometry": null}},
                    {{"type": "Feature", "properties": {{}},
                      "geometry": {{"type": "Point", "coordinates": [1, 1]}}}}
                ]
            }}"#,
            SQUARE
        );
        let b = Boundary::from_geojson_str(&text, "fc").unwrap();
        assert_eq!(b.epsg(), 32633);
        assert_eq!(b.geometry().0.len(), 1);
    }

    #[test]
    fn test_multipolygon_and_collection() {
        let text = r#"{
            "type": "GeometryCollection",
            "geometries": [
                {"type": "MultiPolygon", "coordinates": [
                    [[[0,0],[1,0],[1,1],[0,0]]],
                    [[[5,5],[6,5],[6,6],[5,5]]]
                ]},
                {"type": "LineString", "coordinates": [[0,0],[1,1]]}
            ]
        }"#;
        let b = Boundary::from_geojson_str(text, "gc").unwrap();
        assert_eq!(b.geometry().0.len(), 2);
    }

    #[test]
    fn test_parse_crs_names() {
        assert_eq!(parse_crs_name("urn:ogc:def:crs:EPSG::3857"), Some(3857));
        assert_eq!(parse_crs_name("EPSG:32633"), Some(32633));
        assert_eq!(
            parse_crs_name("http://www.opengis.net/def/crs/EPSG/0/2056"),
            Some(2056)
        );
        assert_eq!(parse_crs_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(4326));
        assert_eq!(parse_crs_name("my-local-grid"), None);
    }

    #[test]
    fn test_unrecognised_crs_is_geometry_error() {
        let text = r#"{"type": "Feature", "properties": null,
            "crs": {"type": "name", "properties": {"name": "local-grid"}},
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}"#;
        let err = Boundary::from_geojson_str(text, "f").unwrap_err();
        assert!(matches!(err, VectorError::GeometryLoad { .. }), "{}", err);
    }

    #[test]
    fn test_no_polygons_is_geometry_error() {
        let text = r#"{"type": "Point", "coordinates": [1, 2]}"#;
        let err = Boundary::from_geojson_str(text, "pt").unwrap_err();
        assert!(matches!(err, VectorError::GeometryLoad { .. }));
    }

    #[test]
    fn test_invalid_json_is_geometry_error() {
        let err = Boundary::from_geojson_str("{ not json", "bad").unwrap_err();
        assert!(matches!(err, VectorError::GeometryLoad { .. }));
    }

    #[test]
    fn test_short_ring_rejected() {
        let text = r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[0,0]]]}"#;
        let err = Boundary::from_geojson_str(text, "short").unwrap_err();
        assert!(err.to_string().contains("at least 4"));
    }

    #[test]
    fn test_non_finite_or_short_position_rejected() {
        let text = r#"{"type": "MultiPolygon", "coordinates": [[[[0,0],[1,0],[1],[0,0]]]]}"#;
        let err = Boundary::from_geojson_str(text, "short-position").unwrap_err();
        assert!(matches!(err, VectorError::GeometryLoad { .. }), "{}", err);
    }

    #[test]
    fn test_holes_survive_conversion() {
        let text = r#"{"type": "Polygon", "coordinates": [
            [[0,0],[4,0],[4,4],[0,4],[0,0]],
            [[1,1],[1,2],[2,2],[2,1],[1,1]]
        ]}"#;
        let b = Boundary::from_geojson_str(text, "holed").unwrap();
        assert_eq!(b.geometry().0[0].interiors().len(), 1);
        assert_relative_eq!(b.geometry().unsigned_area(), 15.0);
    }

    #[test]
    fn test_same_epsg_is_noop() {
        let b = Boundary::from_geojson_str(SQUARE, "square").unwrap();
        assert_eq!(b.to_epsg(4326).unwrap(), b);
    }

    #[test]
    fn test_unknown_target_is_reprojection_error() {
        let b = Boundary::from_geojson_str(SQUARE, "square").unwrap();
        let err = b.to_epsg(1).unwrap_err();
        assert!(matches!(err, VectorError::Reprojection { .. }));
    }
}
