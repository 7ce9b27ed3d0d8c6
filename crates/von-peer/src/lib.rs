//! VON Peer - Voronoi-based overlay network protocol engine
//!
//! Each peer sits at a position in a 2D world with a circular area of interest
//! (AOI). Peers find and stay connected to exactly the peers whose AOI overlaps
//! theirs, with no central directory, by keeping a local Voronoi diagram over
//! the peers they know and exchanging what their diagrams say.
//!
//! # Overview
//!
//! - [`VonPeer`] is the protocol engine: join, move, leave, and a message
//!   state machine driven by [`VonPeer::tick`].
//! - [`NeighborDirectory`] keeps neighbor records and the geometry in step.
//! - [`NetworkPort`] is the transport seam. The peer never opens sockets.
//! - [`Message`] is the wire unit, encoded with bincode.
//!
//! # Example
//!
//! ```rust,ignore
//! use von_peer::{Area, Node, VonConfig, VonPeer};
//! use von_geometry::{Position, SiteId};
//!
//! let mut peer = VonPeer::new(SiteId(7), my_network_port, VonConfig::default())?;
//! let me = Node::new(SiteId(7), Area::circle(Position::new(10.0, 10.0), 100.0), 0, addr);
//! peer.join(me.aoi, &gateway_node)?;
//!
//! loop {
//!     peer.tick();
//!     if peer.is_joined() {
//!         peer.move_to(next_area(), None)?;
//!     }
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod knowledge;
pub mod message;
pub mod network;
pub mod node;
pub mod peer;

pub use config::{DiscoveryMode, DiscoveryPruning, DiscoveryScope, VonConfig};
pub use directory::{NeighborDirectory, UpdateStatus};
pub use error::{Error, Result};
pub use knowledge::{DiscoveryKnowledge, NeighborState};
pub use message::{Message, MessageKind, Payload};
pub use network::{NetworkPort, SendReport};
pub use node::{Area, Node, NodeId, Timestamp};
pub use peer::{is_relevant, PeerState, VonPeer};
