//! Coordinate transformation between EPSG reference systems.
//!
//! Definitions come from the `crs-definitions` database and are evaluated with
//! `proj4rs`, so no native PROJ installation is involved.

use crate::{Result, VectorError};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use std::fmt;

/// PROJ.4 definition of an EPSG code, if the database knows it.
pub fn proj_string(epsg: u16) -> Option<&'static str> {
    crs_definitions::from_code(epsg).map(|def| def.proj4)
}

/// Whether an EPSG code has longitude/latitude axes in degrees.
pub fn is_geographic(epsg: u16) -> bool {
    match proj_string(epsg) {
        Some(proj) => proj.contains("+proj=longlat"),
        None => (4000..5000).contains(&epsg),
    }
}

struct Projections {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

/// Point transformer from one EPSG code to another.
///
/// Construction fails with [`VectorError::Reprojection`] when either code is
/// unknown; transforming the same code to itself is always an identity.
pub struct Reprojector {
    from: u16,
    to: u16,
    projections: Option<Projections>,
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojector")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl Reprojector {
    /// Build a transformer from `from` to `to`.
    pub fn new(from: u16, to: u16) -> Result<Self> {
        if from == to {
            return Ok(Self {
                from,
                to,
                projections: None,
            });
        }

        let load = |epsg: u16| -> Result<Proj> {
            let def = proj_string(epsg).ok_or_else(|| {
                VectorError::reprojection(from, to, format!("EPSG:{} is not a known definition", epsg))
            })?;
            Proj::from_proj_string(def).map_err(|e| {
                VectorError::reprojection(from, to, format!("invalid definition for EPSG:{}: {:?}", epsg, e))
            })
        };

        Ok(Self {
            from,
            to,
            projections: Some(Projections {
                source: load(from)?,
                target: load(to)?,
                source_geographic: is_geographic(from),
                target_geographic: is_geographic(to),
            }),
        })
    }

    /// Source EPSG code.
    pub fn from_epsg(&self) -> u16 {
        self.from
    }

    /// Target EPSG code.
    pub fn to_epsg(&self) -> u16 {
        self.to
    }

    /// True when no transformation is applied.
    pub fn is_identity(&self) -> bool {
        self.projections.is_none()
    }

    /// Transform one point.
    pub fn point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some(p) = &self.projections else {
            return Ok((x, y));
        };

        // proj4rs works in radians on geographic systems
        let mut point = if p.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&p.source, &p.target, &mut point).map_err(|e| {
            VectorError::reprojection(self.from, self.to, format!("({}, {}): {:?}", x, y, e))
        })?;

        let (ox, oy) = if p.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !ox.is_finite() || !oy.is_finite() {
            return Err(VectorError::reprojection(
                self.from,
                self.to,
                format!("({}, {}) has no finite image", x, y),
            ));
        }
        Ok((ox, oy))
    }

    /// Transform every vertex of a multipolygon.
    pub fn multi_polygon(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        if self.is_identity() {
            return Ok(geometry.clone());
        }
        geometry.try_map_coords(|c| {
            let (x, y) = self.point(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}
