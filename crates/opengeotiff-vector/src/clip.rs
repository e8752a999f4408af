//! Intersection of mask polygons with the clipping boundary.

use crate::boundary::Boundary;
use crate::polygonize::PolygonSet;
use crate::Result;
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon, Polygon, Simplify};
use tracing::debug;

/// Relative area difference under which a clipped polygon counts as
/// untouched by the boundary.
pub const AREA_TOLERANCE: f64 = 1e-9;

/// Attributes copied onto every output feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureAttributes {
    /// Lower mask bound.
    pub min: f64,
    /// Upper mask bound.
    pub max: f64,
    /// Locator of the source raster.
    pub source: String,
}

/// Single-part polygon that survived clipping.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedFeature {
    pub polygon: Polygon<f64>,
    pub attributes: FeatureAttributes,
}

/// Clip every polygon of `set` to `boundary`.
///
/// The boundary is brought into the polygons' reference system first; the
/// raster's system is never changed. Polygons entirely inside the boundary
/// come back unchanged, polygons outside it are dropped, and an intersection
/// with several parts yields one feature per part.
pub fn clip(
    set: PolygonSet,
    boundary: &Boundary,
    attributes: &FeatureAttributes,
) -> Result<Vec<ClippedFeature>> {
    let boundary = boundary.to_epsg(set.epsg())?;
    let Some(bounds) = boundary.bounding_rect() else {
        return Ok(Vec::new());
    };

    let total = set.len();
    let mut features = Vec::new();
    let mut outside = 0usize;

    for mask_polygon in set.into_polygons() {
        let polygon = mask_polygon.polygon;
        match polygon.bounding_rect() {
            Some(rect) if rect.intersects(&bounds) => {}
            _ => {
                outside += 1;
                continue;
            }
        }

        let area = polygon.unsigned_area();
        let clipped = MultiPolygon::new(vec![polygon.clone()]).intersection(boundary.geometry());
        if (area - clipped.unsigned_area()).abs() <= AREA_TOLERANCE * area {
            features.push(ClippedFeature {
                polygon,
                attributes: attributes.clone(),
            });
            continue;
        }

        for part in clipped {
            if part.unsigned_area() > 0.0 {
                features.push(ClippedFeature {
                    polygon: part.orient(Direction::Default),
                    attributes: attributes.clone(),
                });
            }
        }
    }

    debug!(
        "Clipped {} polygon(s) to {} feature(s), {} outside the boundary extent",
        total,
        features.len(),
        outside
    );
    Ok(features)
}

/// Ramer-Douglas-Peucker simplification of each feature.
///
/// Features that collapse to zero area are dropped.
pub fn simplify_features(features: Vec<ClippedFeature>, tolerance: f64) -> Vec<ClippedFeature> {
    let before = features.len();
    let simplified: Vec<ClippedFeature> = features
        .into_iter()
        .filter_map(|feature| {
            let polygon = feature.polygon.simplify(&tolerance);
            (polygon.exterior().0.len() >= 4 && polygon.unsigned_area() > 0.0).then(|| {
                ClippedFeature {
                    polygon,
                    attributes: feature.attributes,
                }
            })
        })
        .collect();
    debug!(
        "Simplified {} feature(s) with tolerance {}, {} kept",
        before,
        tolerance,
        simplified.len()
    );
    simplified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygonize::{polygonize, MaskPolygon};
    use approx::assert_relative_eq;
    use geo::polygon;
    use opengeotiff_raster::{GeoTransform, MaskGrid};

    fn attrs() -> FeatureAttributes {
        FeatureAttributes {
            min: 0.0,
            max: 1000.0,
            source: "test.tif".to_string(),
        }
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]
    }

    fn boundary(polys: Vec<Polygon<f64>>) -> Boundary {
        Boundary::new(MultiPolygon::new(polys), 4326)
    }

    fn set(polys: Vec<Polygon<f64>>) -> PolygonSet {
        PolygonSet::new(
            4326,
            polys
                .into_iter()
                .map(|polygon| MaskPolygon {
                    polygon,
                    cell_count: 0,
                })
                .collect(),
        )
    }

    #[test]
    fn test_contained_polygon_is_unchanged() {
        let poly = rect(1.0, 1.0, 2.0, 3.0).orient(Direction::Default);
        let b = boundary(vec![rect(0.0, 0.0, 10.0, 10.0)]);
        let out = clip(set(vec![poly.clone()]), &b, &attrs()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].polygon, poly);
        assert_eq!(out[0].attributes, attrs());
    }

    #[test]
    fn test_clip_is_idempotent() {
        let b = boundary(vec![rect(0.0, 0.0, 1.5, 10.0)]);
        let first = clip(set(vec![rect(0.0, 0.0, 4.0, 2.0)]), &b, &attrs()).unwrap();
        assert_eq!(first.len(), 1);
        assert_relative_eq!(first[0].polygon.unsigned_area(), 3.0, epsilon = 1e-9);

        let again = clip(
            set(first.iter().map(|f| f.polygon.clone()).collect()),
            &b,
            &attrs(),
        )
        .unwrap();
        assert_eq!(again[0].polygon, first[0].polygon);
    }

    #[test]
    fn test_disjoint_polygon_dropped() {
        let out = clip(
            set(vec![rect(20.0, 20.0, 21.0, 21.0)]),
            &boundary(vec![rect(0.0, 0.0, 1.0, 1.0)]),
            &attrs(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_edge_touch_yields_nothing() {
        let out = clip(
            set(vec![rect(1.0, 0.0, 2.0, 1.0)]),
            &boundary(vec![rect(0.0, 0.0, 1.0, 1.0)]),
            &attrs(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_multipart_result_splits() {
        let b = boundary(vec![rect(0.0, 0.0, 1.0, 1.0), rect(3.0, 0.0, 4.0, 1.0)]);
        let out = clip(set(vec![rect(0.0, 0.0, 4.0, 1.0)]), &b, &attrs()).unwrap();
        assert_eq!(out.len(), 2);
        for feature in &out {
            assert_relative_eq!(feature.polygon.unsigned_area(), 1.0, epsilon = 1e-9);
            assert!(geo::Winding::is_ccw(feature.polygon.exterior()));
        }
    }

    #[test]
    fn test_polygonized_checkerboard_left_half() {
        let mask = MaskGrid::from_rows(&[
            &[true, false, true, false],
            &[true, false, true, false],
            &[false, true, false, true],
            &[false, true, false, true],
        ]);
        let gt = GeoTransform::from_origin(0.0, 4.0, 1.0, -1.0);
        let polygons = polygonize(&mask, &gt, 4326);

        let out = clip(polygons, &boundary(vec![rect(0.0, 0.0, 2.0, 4.0)]), &attrs()).unwrap();
        let area: f64 = out.iter().map(|f| f.polygon.unsigned_area()).sum();
        assert_relative_eq!(area, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_boundary_reprojected_to_raster_crs() {
        // Raster in Web Mercator, boundary in degrees around the origin
        let polygons = PolygonSet::new(
            3857,
            vec![MaskPolygon {
                polygon: rect(-1000.0, -1000.0, 1000.0, 1000.0),
                cell_count: 4,
            }],
        );
        let b = Boundary::new(MultiPolygon::new(vec![rect(0.0, -1.0, 1.0, 1.0)]), 4326);

        let out = clip(polygons, &b, &attrs()).unwrap();
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].polygon.unsigned_area(), 2_000_000.0, max_relative = 1e-6);
    }

    #[test]
    fn test_simplify_removes_small_deviations() {
        let jagged = polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.1),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let features = vec![ClippedFeature {
            polygon: jagged,
            attributes: attrs(),
        }];
        let out = simplify_features(features, 1.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].polygon.exterior().0.len(), 5);
        assert_relative_eq!(out[0].polygon.unsigned_area(), 100.0);
    }
}
