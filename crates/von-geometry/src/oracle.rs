//! The geometry contract the overlay protocol is written against.
//!
//! Any correct planar Voronoi/Delaunay implementation can sit behind this
//! trait. The protocol only ever asks the questions below, and expects every
//! answer to reflect the most recent insert/remove/update.

use thiserror::Error;

use crate::{Position, Segment};

/// Identifier of a site in the diagram.
///
/// The overlay uses node ids directly as site ids, so this is an opaque
/// unsigned integer with a total order (used for tie-breaking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SiteId(pub u64);

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SiteId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Errors from site-set mutation.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("site {0} is already registered")]
    DuplicateSite(SiteId),

    #[error("site {0} is not registered")]
    UnknownSite(SiteId),

    #[error("position {0} is not finite")]
    InvalidPosition(Position),
}

/// A Voronoi edge together with the two sites it separates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoronoiEdge {
    /// Site on one side (always the smaller id).
    pub a: SiteId,
    /// Site on the other side.
    pub b: SiteId,
    pub segment: Segment,
}

/// Geometry-only queries over a dynamic set of sites.
pub trait GeometryOracle {
    /// Register a new site.
    fn insert(&mut self, id: SiteId, position: Position) -> Result<(), GeometryError>;

    /// Remove a site.
    fn remove(&mut self, id: SiteId) -> Result<(), GeometryError>;

    /// Move an existing site.
    fn update(&mut self, id: SiteId, position: Position) -> Result<(), GeometryError>;

    /// Position of a site.
    fn get(&self, id: SiteId) -> Option<Position>;

    /// Whether `point` falls inside the Voronoi cell of `id`.
    fn contains(&self, id: SiteId, point: Position) -> bool;

    /// Site nearest to `point`; ties go to the smallest id.
    fn closest_to(&self, point: Position) -> Option<SiteId>;

    /// Whether `a` and `b` share a Voronoi edge (are Delaunay-adjacent).
    fn is_enclosing(&self, a: SiteId, b: SiteId) -> bool;

    /// Delaunay neighbors of `id`, ascending by id.
    fn enclosing_neighbors(&self, id: SiteId) -> Vec<SiteId>;

    /// Whether site `id` lies within `radius` of `center`.
    ///
    /// With `tolerant` set, a site whose cell reaches into the circle also
    /// counts, which absorbs error from a locally incomplete diagram.
    fn overlaps(&self, id: SiteId, center: Position, radius: f64, tolerant: bool) -> bool;

    /// Whether the cell of `id` is not fully inside the circle `(center, radius)`.
    ///
    /// Such a neighbor sits on the frontier of what the mover can see.
    fn is_boundary(&self, id: SiteId, center: Position, radius: f64) -> bool;

    /// Every Voronoi edge in the diagram.
    fn edges(&self) -> Vec<VoronoiEdge>;

    /// Number of registered sites.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all sites.
    fn clear(&mut self);
}
