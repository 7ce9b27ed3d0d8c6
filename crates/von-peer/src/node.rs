//! Node records: who a peer is, where it is, and when that was last true.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use von_geometry::{Position, SiteId};

/// Unique peer identifier. Peers are registered in the diagram under their id.
pub type NodeId = SiteId;

/// Logical or physical time as reported by the network port.
pub type Timestamp = u64;

/// Area of interest: a circle around the peer's position.
///
/// `width` and `height` are carried for rectangular variants; the protocol
/// itself only looks at the circle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Area {
    pub center: Position,
    pub radius: f64,
    pub width: f64,
    pub height: f64,
}

impl Area {
    /// Circular AOI.
    pub const fn circle(center: Position, radius: f64) -> Self {
        Self {
            center,
            radius,
            width: 0.0,
            height: 0.0,
        }
    }

    /// Same AOI shape at a new center.
    pub fn moved_to(&self, center: Position) -> Self {
        Self { center, ..*self }
    }

    /// Whether two areas differ only in their centers.
    pub fn same_shape(&self, other: &Area) -> bool {
        self.radius == other.radius && self.width == other.width && self.height == other.height
    }

    /// Whether a point falls inside the circle.
    pub fn covers(&self, point: &Position) -> bool {
        self.center.distance(point) <= self.radius
    }
}

/// What a peer knows about another peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub aoi: Area,
    /// Time of the last authoritative update from the node's owner.
    pub time: Timestamp,
    pub addr: SocketAddr,
}

impl Node {
    pub fn new(id: NodeId, aoi: Area, time: Timestamp, addr: SocketAddr) -> Self {
        Self { id, aoi, time, addr }
    }

    pub fn position(&self) -> Position {
        self.aoi.center
    }

    /// Check if this info is strictly newer than another.
    pub fn is_newer_than(&self, other: &Node) -> bool {
        self.time > other.time
    }

    /// Whether this info is older than what `current` already holds.
    ///
    /// Equal timestamps are not stale: the owner may re-announce at the same time.
    pub fn is_stale_against(&self, current: &Node) -> bool {
        self.time < current.time
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} r={} t={}", self.id, self.aoi.center, self.aoi.radius, self.time)
    }
}
