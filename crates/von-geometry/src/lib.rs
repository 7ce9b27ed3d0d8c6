//! VON Geometry
//!
//! Planar Voronoi geometry for a Voronoi-based overlay network (VON).
//!
//! # Role in the overlay
//!
//! Every peer keeps a private Voronoi diagram over the positions of the peers
//! it knows about. The diagram answers the questions the overlay protocol asks:
//!
//! - which known peers are *enclosing neighbors* (share a Voronoi edge),
//! - which cell owns a point (join routing),
//! - whether a site falls inside an area of interest (AOI),
//! - whether a site's cell reaches outside an AOI circle (*boundary neighbors*).
//!
//! The protocol talks to the diagram only through [`GeometryOracle`], so any
//! correct planar Voronoi/Delaunay implementation can replace [`Voronoi`].

mod oracle;
mod position;
mod voronoi;

pub use oracle::{GeometryError, GeometryOracle, SiteId, VoronoiEdge};
pub use position::{Position, Segment, EPSILON};
pub use voronoi::{Cell, CellEdge, Voronoi};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_is_object_safe() {
        let mut boxed: Box<dyn GeometryOracle> = Box::new(Voronoi::new());
        boxed.insert(SiteId(1), Position::ORIGIN).unwrap();
        boxed.insert(SiteId(2), Position::new(10.0, 0.0)).unwrap();
        assert_eq!(boxed.len(), 2);
        assert!(boxed.is_enclosing(SiteId(1), SiteId(2)));
        boxed.clear();
        assert!(boxed.is_empty());
    }
}
