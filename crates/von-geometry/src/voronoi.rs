//! Voronoi diagram built by half-plane clipping.
//!
//! Each cell is computed on demand: start from a bounding box around all
//! sites and clip it by the perpendicular bisector against every other site.
//! Every clip edge remembers which site produced it, so the finished polygon
//! directly yields the site's Delaunay neighbors.
//!
//! This is O(n) clips per cell, which is cheap at the neighbor counts a VON
//! peer keeps (tens of sites), and never goes stale since nothing is cached.
//!
//! The box is padded far beyond the site extent so that unbounded edges
//! between hull sites still show up as finite edges. Adjacency between almost
//! collinear sites whose shared edge lies outside the padded box is dropped.

use std::collections::BTreeMap;

use crate::oracle::{GeometryError, GeometryOracle, SiteId, VoronoiEdge};
use crate::{Position, Segment, EPSILON};

/// Padding around the site extent, as a multiple of that extent.
const BOUNDS_SCALE: f64 = 16.0;

/// Minimum padding around the site extent.
const MIN_BOUNDS_MARGIN: f64 = 1.0e4;

/// Edges shorter than this are treated as degenerate (cocircular sites).
const MIN_EDGE_LENGTH: f64 = 1.0e-6;

/// One edge of a cell polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellEdge {
    pub segment: Segment,
    /// Site on the other side, or `None` for the clipping box.
    pub neighbor: Option<SiteId>,
}

/// The (box-clipped) Voronoi cell of one site.
#[derive(Debug, Clone)]
pub struct Cell {
    pub site: SiteId,
    pub position: Position,
    pub edges: Vec<CellEdge>,
}

impl Cell {
    /// Sites that share an edge with this cell, ascending.
    pub fn neighbors(&self) -> Vec<SiteId> {
        let mut ids: Vec<SiteId> = self.edges.iter().filter_map(|e| e.neighbor).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Whether every vertex of the cell lies within the disc.
    pub fn is_inside_disc(&self, center: &Position, radius: f64) -> bool {
        self.edges
            .iter()
            .all(|e| e.segment.p1.distance(center) <= radius + EPSILON)
    }

    /// Edges between this site and a real neighbor.
    pub fn voronoi_edges(&self) -> impl Iterator<Item = &CellEdge> {
        self.edges.iter().filter(|e| e.neighbor.is_some())
    }
}

/// Polygon vertex tagged with the site that produced the edge leaving it.
type TaggedVertex = (Position, Option<SiteId>);

/// A Voronoi diagram over a dynamic site set.
#[derive(Debug, Clone, Default)]
pub struct Voronoi {
    sites: BTreeMap<SiteId, Position>,
}

impl Voronoi {
    pub fn new() -> Self {
        Self {
            sites: BTreeMap::new(),
        }
    }

    /// Build a diagram from an iterator of sites. Later duplicates are ignored.
    pub fn from_sites<I>(sites: I) -> Self
    where
        I: IntoIterator<Item = (SiteId, Position)>,
    {
        let mut diagram = Self::new();
        for (id, pos) in sites {
            let _ = diagram.insert(id, pos);
        }
        diagram
    }

    /// All registered sites, ascending by id.
    pub fn sites(&self) -> impl Iterator<Item = (SiteId, Position)> + '_ {
        self.sites.iter().map(|(id, pos)| (*id, *pos))
    }

    /// Compute the cell of a site.
    pub fn cell(&self, id: SiteId) -> Option<Cell> {
        let site = *self.sites.get(&id)?;
        let (lo, hi) = self.clip_bounds();

        // Counter-clockwise box.
        let mut polygon: Vec<TaggedVertex> = vec![
            (Position::new(lo.x, lo.y), None),
            (Position::new(hi.x, lo.y), None),
            (Position::new(hi.x, hi.y), None),
            (Position::new(lo.x, hi.y), None),
        ];

        for (&other, &pos) in &self.sites {
            if other == id || pos.approx_eq(&site) {
                continue;
            }
            polygon = clip(&polygon, site, pos, other);
            if polygon.is_empty() {
                break;
            }
        }

        let n = polygon.len();
        let edges = (0..n)
            .filter_map(|i| {
                let (from, neighbor) = polygon[i];
                let (to, _) = polygon[(i + 1) % n];
                let segment = Segment::new(from, to);
                (segment.length() > MIN_EDGE_LENGTH).then_some(CellEdge { segment, neighbor })
            })
            .collect();

        Some(Cell {
            site: id,
            position: site,
            edges,
        })
    }

    fn clip_bounds(&self) -> (Position, Position) {
        let mut lo = Position::new(f64::MAX, f64::MAX);
        let mut hi = Position::new(f64::MIN, f64::MIN);
        for pos in self.sites.values() {
            lo.x = lo.x.min(pos.x);
            lo.y = lo.y.min(pos.y);
            hi.x = hi.x.max(pos.x);
            hi.y = hi.y.max(pos.y);
        }
        if self.sites.is_empty() {
            lo = Position::ORIGIN;
            hi = Position::ORIGIN;
        }

        let extent = (hi.x - lo.x).max(hi.y - lo.y).max(1.0);
        let margin = (extent * BOUNDS_SCALE).max(MIN_BOUNDS_MARGIN);
        (
            Position::new(lo.x - margin, lo.y - margin),
            Position::new(hi.x + margin, hi.y + margin),
        )
    }
}

/// Sutherland-Hodgman step: keep the half-plane closer to `site` than to
/// `other`, tagging the new edge along the bisector with `other_id`.
fn clip(polygon: &[TaggedVertex], site: Position, other: Position, other_id: SiteId) -> Vec<TaggedVertex> {
    let normal = other - site;
    let mid = site.midpoint(&other);
    let tolerance = EPSILON * normal.dot(&normal).sqrt().max(1.0);
    let side = |p: &Position| (*p - mid).dot(&normal);

    let n = polygon.len();
    let mut out = Vec::with_capacity(n + 1);

    for i in 0..n {
        let (cur, tag) = polygon[i];
        let (next, _) = polygon[(i + 1) % n];
        let (s_cur, s_next) = (side(&cur), side(&next));
        let cur_in = s_cur <= tolerance;
        let next_in = s_next <= tolerance;

        match (cur_in, next_in) {
            (true, true) => out.push((cur, tag)),
            (true, false) => {
                out.push((cur, tag));
                out.push((intersect(cur, next, s_cur, s_next), Some(other_id)));
            }
            (false, true) => out.push((intersect(cur, next, s_cur, s_next), tag)),
            (false, false) => {}
        }
    }

    out
}

fn intersect(a: Position, b: Position, side_a: f64, side_b: f64) -> Position {
    let t = side_a / (side_a - side_b);
    a + (b - a) * t
}

fn check_finite(position: Position) -> Result<(), GeometryError> {
    if position.x.is_finite() && position.y.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::InvalidPosition(position))
    }
}

impl GeometryOracle for Voronoi {
    fn insert(&mut self, id: SiteId, position: Position) -> Result<(), GeometryError> {
        check_finite(position)?;
        if self.sites.contains_key(&id) {
            return Err(GeometryError::DuplicateSite(id));
        }
        self.sites.insert(id, position);
        Ok(())
    }

    fn remove(&mut self, id: SiteId) -> Result<(), GeometryError> {
        self.sites
            .remove(&id)
            .map(|_| ())
            .ok_or(GeometryError::UnknownSite(id))
    }

    fn update(&mut self, id: SiteId, position: Position) -> Result<(), GeometryError> {
        check_finite(position)?;
        let slot = self.sites.get_mut(&id).ok_or(GeometryError::UnknownSite(id))?;
        *slot = position;
        Ok(())
    }

    fn get(&self, id: SiteId) -> Option<Position> {
        self.sites.get(&id).copied()
    }

    fn contains(&self, id: SiteId, point: Position) -> bool {
        let Some(site) = self.get(id) else {
            return false;
        };
        let own = point.distance_squared(&site);
        let tolerance = EPSILON * own.max(1.0);
        self.sites
            .iter()
            .filter(|(other, _)| **other != id)
            .all(|(_, pos)| own <= point.distance_squared(pos) + tolerance)
    }

    fn closest_to(&self, point: Position) -> Option<SiteId> {
        let mut best: Option<(SiteId, f64)> = None;
        // Ascending id order, so a strict comparison keeps the smallest id on ties.
        for (&id, pos) in &self.sites {
            let d = point.distance_squared(pos);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((id, d)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn is_enclosing(&self, a: SiteId, b: SiteId) -> bool {
        if a == b || !self.sites.contains_key(&b) {
            return false;
        }
        self.cell(a)
            .map(|cell| cell.edges.iter().any(|e| e.neighbor == Some(b)))
            .unwrap_or(false)
    }

    fn enclosing_neighbors(&self, id: SiteId) -> Vec<SiteId> {
        self.cell(id).map(|cell| cell.neighbors()).unwrap_or_default()
    }

    fn overlaps(&self, id: SiteId, center: Position, radius: f64, tolerant: bool) -> bool {
        let Some(site) = self.get(id) else {
            return false;
        };
        if site.distance(&center) <= radius {
            return true;
        }
        if !tolerant {
            return false;
        }
        if self.contains(id, center) {
            return true;
        }
        self.cell(id)
            .map(|cell| cell.edges.iter().any(|e| e.segment.touches_disc(&center, radius)))
            .unwrap_or(false)
    }

    fn is_boundary(&self, id: SiteId, center: Position, radius: f64) -> bool {
        self.cell(id)
            .map(|cell| !cell.is_inside_disc(&center, radius))
            .unwrap_or(false)
    }

    fn edges(&self) -> Vec<VoronoiEdge> {
        let mut edges = Vec::new();
        for &id in self.sites.keys() {
            let Some(cell) = self.cell(id) else { continue };
            for edge in cell.voronoi_edges() {
                if let Some(other) = edge.neighbor {
                    if id < other {
                        edges.push(VoronoiEdge {
                            a: id,
                            b: other,
                            segment: edge.segment,
                        });
                    }
                }
            }
        }
        edges
    }

    fn len(&self) -> usize {
        self.sites.len()
    }

    fn clear(&mut self) {
        self.sites.clear();
    }
}
