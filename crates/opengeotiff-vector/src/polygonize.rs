//! Conversion of a boolean mask into polygons.
//!
//! True cells are grouped into maximal connected regions (8-connected by
//! default) and each region becomes one polygon. Boundaries are traced along
//! cell edges on the integer corner lattice, never through cell centers, so
//! every vertex is a pixel corner mapped through the geotransform. The same
//! lattice corner therefore always yields the same bit-exact coordinate, no
//! matter which region's boundary it belongs to.
//!
//! ## Tracing
//!
//! Every side of a region cell that faces a cell outside the mask becomes a
//! directed lattice edge with the region on its left (as seen with rows
//! running down the screen). Chaining edges head-to-tail gives closed rings:
//! one outer ring per region plus one ring per enclosed hole.
//!
//! A lattice corner where only two diagonally opposite cells belong to the
//! region has two outgoing edges. Under 8-connectivity the walk turns right
//! there, crossing over to the diagonal cell, so the two cells stay in one
//! ring that touches itself at that corner. Under 4-connectivity the walk
//! turns left and stays around the current cell.

use geo::orient::{Direction, Orient};
use geo::{Coord, LineString, Polygon};
use opengeotiff_raster::{GeoTransform, MaskGrid};
use std::collections::HashMap;
use tracing::debug;

/// Which neighbouring cells count as touching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge neighbours only.
    Four,
    /// Edge and corner neighbours.
    #[default]
    Eight,
}

const FOUR_NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const EIGHT_NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Connectivity {
    fn neighbours(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &FOUR_NEIGHBOURS,
            Connectivity::Eight => &EIGHT_NEIGHBOURS,
        }
    }
}

/// Polygon covering one connected mask region.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPolygon {
    /// Region outline in world coordinates (exterior CCW, holes CW).
    pub polygon: Polygon<f64>,
    /// Number of mask cells inside the polygon.
    pub cell_count: usize,
}

/// Polygons produced from one raster, in that raster's reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonSet {
    epsg: u16,
    polygons: Vec<MaskPolygon>,
}

impl PolygonSet {
    /// Create a set of polygons expressed in `epsg`.
    pub fn new(epsg: u16, polygons: Vec<MaskPolygon>) -> Self {
        Self { epsg, polygons }
    }

    /// EPSG code of the polygons' coordinates.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// The polygons, in region discovery order (row-major).
    pub fn polygons(&self) -> &[MaskPolygon] {
        &self.polygons
    }

    /// Consume the set, keeping the polygons.
    pub fn into_polygons(self) -> Vec<MaskPolygon> {
        self.polygons
    }

    /// Number of polygons.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Whether the set holds no polygons.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Total mask cells covered by all polygons.
    pub fn cell_count(&self) -> usize {
        self.polygons.iter().map(|p| p.cell_count).sum()
    }
}

/// Lattice corner `(x, y)` = `(col, row)`.
type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
}

impl Edge {
    /// Unit step of the edge in lattice space (rows grow downwards).
    fn dir(&self) -> (isize, isize) {
        (
            self.to.0 as isize - self.from.0 as isize,
            self.to.1 as isize - self.from.1 as isize,
        )
    }
}

/// Polygonize a mask with 8-connectivity.
pub fn polygonize(mask: &MaskGrid, transform: &GeoTransform, epsg: u16) -> PolygonSet {
    polygonize_with(mask, transform, epsg, Connectivity::Eight)
}

/// Polygonize a mask with an explicit connectivity rule.
pub fn polygonize_with(
    mask: &MaskGrid,
    transform: &GeoTransform,
    epsg: u16,
    connectivity: Connectivity,
) -> PolygonSet {
    let (labels, regions) = label_regions(mask, connectivity);
    let edges = collect_edges(mask, &labels, regions);

    let mut polygons = Vec::with_capacity(regions);
    for region_edges in &edges {
        let rings = trace_rings(region_edges, connectivity);
        polygons.extend(assemble_polygons(rings, transform));
    }

    debug!(
        "Polygonized {} cells into {} polygon(s) ({:?}-connected)",
        mask.count_true(),
        polygons.len(),
        connectivity
    );

    PolygonSet::new(epsg, polygons)
}

/// Flood-fill labelling. Label 0 is background; regions are numbered from 1
/// in row-major order of their first cell.
fn label_regions(mask: &MaskGrid, connectivity: Connectivity) -> (Vec<u32>, usize) {
    let width = mask.width();
    let cells = mask.cells();
    let mut labels = vec![0u32; cells.len()];
    let mut next = 0u32;
    let mut stack = Vec::new();

    for start in 0..cells.len() {
        if !cells[start] || labels[start] != 0 {
            continue;
        }
        next += 1;
        labels[start] = next;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            let (row, col) = ((idx / width) as isize, (idx % width) as isize);
            for &(dr, dc) in connectivity.neighbours() {
                let (nr, nc) = (row + dr, col + dc);
                if mask.get(nr, nc) {
                    let n = nr as usize * width + nc as usize;
                    if labels[n] == 0 {
                        labels[n] = next;
                        stack.push(n);
                    }
                }
            }
        }
    }

    (labels, next as usize)
}

/// Boundary edges of every region, bucketed by label.
fn collect_edges(mask: &MaskGrid, labels: &[u32], regions: usize) -> Vec<Vec<Edge>> {
    let width = mask.width();
    let mut edges: Vec<Vec<Edge>> = vec![Vec::new(); regions];

    for (idx, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        let (x, y) = (idx % width, idx / width);
        let (r, c) = (y as isize, x as isize);
        let bucket = &mut edges[label as usize - 1];

        if !mask.get(r - 1, c) {
            bucket.push(Edge { from: (x + 1, y), to: (x, y) });
        }
        if !mask.get(r, c - 1) {
            bucket.push(Edge { from: (x, y), to: (x, y + 1) });
        }
        if !mask.get(r + 1, c) {
            bucket.push(Edge { from: (x, y + 1), to: (x + 1, y + 1) });
        }
        if !mask.get(r, c + 1) {
            bucket.push(Edge { from: (x + 1, y + 1), to: (x + 1, y) });
        }
    }

    edges
}

/// Chain a region's edges into closed rings of corner vertices.
fn trace_rings(edges: &[Edge], connectivity: Connectivity) -> Vec<Vec<Vertex>> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let mut visited = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if visited[start] {
            continue;
        }

        let mut chain = Vec::new();
        let mut current = start;
        loop {
            visited[current] = true;
            chain.push(current);
            match next_edge(edges, &outgoing, current, connectivity) {
                Some(next) if next == start => break,
                Some(next) if !visited[next] => current = next,
                // Every lattice vertex has equal in- and out-degree
                _ => {
                    debug_assert!(false, "open boundary chain at edge {}", current);
                    break;
                }
            }
        }

        rings.push(corner_vertices(edges, &chain));
    }

    rings
}

/// Successor of `current` in its ring.
fn next_edge(
    edges: &[Edge],
    outgoing: &HashMap<Vertex, Vec<usize>>,
    current: usize,
    connectivity: Connectivity,
) -> Option<usize> {
    let candidates = outgoing.get(&edges[current].to)?;
    if candidates.len() == 1 {
        return Some(candidates[0]);
    }

    // Pinch vertex: right turn joins the diagonal cells, left turn separates them
    let (dx, dy) = edges[current].dir();
    let wanted = match connectivity {
        Connectivity::Eight => (-dy, dx),
        Connectivity::Four => (dy, -dx),
    };
    candidates
        .iter()
        .copied()
        .find(|&i| edges[i].dir() == wanted)
}

/// Keep only the vertices where the ring changes direction.
fn corner_vertices(edges: &[Edge], chain: &[usize]) -> Vec<Vertex> {
    let n = chain.len();
    (0..n)
        .filter(|&i| edges[chain[i]].dir() != edges[chain[(i + n - 1) % n]].dir())
        .map(|i| edges[chain[i]].from)
        .collect()
}

/// Twice the signed shoelace area in lattice units.
///
/// With rows growing downwards, outer rings come out negative and hole
/// rings positive.
fn twice_signed_area(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
        })
        .sum()
}

fn lattice_bounds(ring: &[Vertex]) -> (Vertex, Vertex) {
    let min_x = ring.iter().map(|v| v.0).min().unwrap_or(0);
    let min_y = ring.iter().map(|v| v.1).min().unwrap_or(0);
    let max_x = ring.iter().map(|v| v.0).max().unwrap_or(0);
    let max_y = ring.iter().map(|v| v.1).max().unwrap_or(0);
    ((min_x, min_y), (max_x, max_y))
}

/// Turn one region's rings into polygons.
///
/// A connected region has exactly one outer ring. Should tracing ever
/// produce more, each hole goes to the smallest outer ring whose lattice
/// bounds contain it.
fn assemble_polygons(rings: Vec<Vec<Vertex>>, transform: &GeoTransform) -> Vec<MaskPolygon> {
    let (exteriors, holes): (Vec<_>, Vec<_>) = rings
        .into_iter()
        .map(|ring| (twice_signed_area(&ring), ring))
        .partition(|(area, _)| *area < 0);

    debug_assert!(
        exteriors.len() <= 1,
        "connected region traced to {} outer rings",
        exteriors.len()
    );

    let mut assigned: Vec<Vec<(i64, Vec<Vertex>)>> = vec![Vec::new(); exteriors.len()];
    for hole in holes {
        let ((hx0, hy0), (hx1, hy1)) = lattice_bounds(&hole.1);
        let owner = exteriors
            .iter()
            .enumerate()
            .filter(|(_, (_, ext))| {
                let ((ex0, ey0), (ex1, ey1)) = lattice_bounds(ext);
                ex0 <= hx0 && ey0 <= hy0 && ex1 >= hx1 && ey1 >= hy1
            })
            .min_by_key(|(_, (area, _))| area.abs())
            .map(|(i, _)| i);
        if let Some(owner) = owner {
            assigned[owner].push(hole);
        }
    }

    exteriors
        .into_iter()
        .zip(assigned)
        .map(|((ext_area, ext), holes)| {
            let hole_area: i64 = holes.iter().map(|(a, _)| *a).sum();
            let cell_count = ((ext_area.abs() - hole_area) / 2) as usize;
            let interiors = holes
                .iter()
                .map(|(_, ring)| to_world(ring, transform))
                .collect();
            let polygon = Polygon::new(to_world(&ext, transform), interiors)
                .orient(Direction::Default);
            MaskPolygon {
                polygon,
                cell_count,
            }
        })
        .collect()
}

/// Map lattice corners to a closed world-coordinate ring.
fn to_world(ring: &[Vertex], transform: &GeoTransform) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(x, y)| {
            let (wx, wy) = transform.apply(x as f64, y as f64);
            Coord { x: wx, y: wy }
        })
        .collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}
