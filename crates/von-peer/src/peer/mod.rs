//! The VON protocol engine.
//!
//! A [`VonPeer`] owns its own node, a [`NeighborDirectory`] (and through it
//! the geometry), and the bookkeeping for neighbors that are not confirmed
//! yet. It is driven from outside:
//!
//! - the application calls [`VonPeer::join`], [`VonPeer::move_to`] and
//!   [`VonPeer::leave`] between ticks
//! - [`VonPeer::tick`] drains the inbound queue, then runs the maintenance
//!   passes in a fixed order
//!
//! Nothing here blocks or spawns. Every handler runs to completion before the
//! next message is looked at.

mod handlers;
mod maintenance;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};
use von_geometry::{GeometryOracle, Position, Voronoi};

use crate::config::{to_timestamp_units, VonConfig};
use crate::directory::{NeighborDirectory, UpdateStatus};
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind, Payload};
use crate::network::NetworkPort;
use crate::node::{Area, Node, NodeId, Timestamp};

/// Membership state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// Not part of the overlay. All messages are ignored.
    #[default]
    Absent,
    /// QUERY sent, waiting to learn a first neighbor.
    Joining,
    /// Part of the overlay.
    Joined,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerState::Absent => write!(f, "Absent"),
            PeerState::Joining => write!(f, "Joining"),
            PeerState::Joined => write!(f, "Joined"),
        }
    }
}

/// A neighbor we sent HELLO to and are waiting on.
#[derive(Debug, Clone)]
struct PendingNeighbor {
    node: Node,
    since: Timestamp,
}

/// Whether `b` is worth connecting to from `a`'s point of view.
///
/// True when they are enclosing neighbors, or either one's site falls inside
/// the other's AOI widened by `buffer`.
pub fn is_relevant<G: GeometryOracle + ?Sized>(
    geometry: &G,
    a: &Node,
    b: &Node,
    buffer: f64,
    tolerant: bool,
) -> bool {
    geometry.is_enclosing(a.id, b.id)
        || geometry.overlaps(a.id, b.aoi.center, b.aoi.radius + buffer, tolerant)
        || geometry.overlaps(b.id, a.aoi.center, a.aoi.radius + buffer, tolerant)
}

/// A single participant in the overlay.
pub struct VonPeer<N: NetworkPort, G: GeometryOracle + Clone = Voronoi> {
    net: N,
    config: VonConfig,
    self_node: Node,
    state: PeerState,
    directory: NeighborDirectory<G>,
    /// Nodes learned through NODE gossip, not contacted yet.
    candidates: BTreeMap<NodeId, Node>,
    /// Nodes sent a HELLO, waiting for HELLO_R.
    pending: BTreeMap<NodeId, PendingNeighbor>,
    /// Neighbors that asked for a discovery check since the last pass.
    requesters: BTreeSet<NodeId>,
    /// When self last told its neighbors where it is.
    last_announce: Timestamp,
}

impl<N: NetworkPort> VonPeer<N> {
    /// Create a peer over the built-in Voronoi geometry.
    pub fn new(id: NodeId, net: N, config: VonConfig) -> Result<Self> {
        Self::with_geometry(id, net, config, Voronoi::new())
    }
}

impl<N: NetworkPort, G: GeometryOracle + Clone> VonPeer<N, G> {
    /// Create a peer over a caller-supplied geometry oracle.
    ///
    /// The oracle should be empty; it is cleared if not.
    pub fn with_geometry(id: NodeId, net: N, config: VonConfig, mut geometry: G) -> Result<Self> {
        config.validate()?;
        geometry.clear();
        let self_node = Node::new(id, Area::default(), 0, net.host_address());
        Ok(Self {
            net,
            config,
            self_node,
            state: PeerState::Absent,
            directory: NeighborDirectory::new(id, geometry),
            candidates: BTreeMap::new(),
            pending: BTreeMap::new(),
            requesters: BTreeSet::new(),
            last_announce: 0,
        })
    }

    pub fn id(&self) -> NodeId {
        self.self_node.id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn config(&self) -> &VonConfig {
        &self.config
    }

    /// Our own node record.
    pub fn self_node(&self) -> &Node {
        &self.self_node
    }

    pub fn neighbor(&self, id: NodeId) -> Option<&Node> {
        self.directory.get(id)
    }

    /// Known neighbors, ascending by id. Never includes self.
    pub fn neighbors(&self) -> impl Iterator<Item = &Node> {
        self.directory.nodes()
    }

    pub fn neighbor_count(&self) -> usize {
        self.directory.len()
    }

    pub fn is_neighbor(&self, id: NodeId) -> bool {
        self.directory.contains(id)
    }

    /// The local diagram: self plus every known neighbor.
    pub fn geometry(&self) -> &G {
        self.directory.geometry()
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    /// Neighbors that requested a discovery check for the next pass.
    pub fn discovery_requests(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.requesters.iter().copied()
    }

    /// Drain the record of which neighbors changed since the last call.
    pub fn take_update_status(&mut self) -> BTreeMap<NodeId, UpdateStatus> {
        self.directory.take_update_status()
    }

    /// Whether the peer is part of the overlay.
    ///
    /// A joining peer counts as joined as soon as it knows one neighbor.
    pub fn is_joined(&self) -> bool {
        match self.state {
            PeerState::Joined => true,
            PeerState::Joining => !self.directory.is_empty(),
            PeerState::Absent => false,
        }
    }

    /// Enter the overlay at `aoi` through `gateway`.
    ///
    /// Joining through ourselves bootstraps a new overlay. No-op if already
    /// joined.
    pub fn join(&mut self, aoi: Area, gateway: &Node) -> Result<()> {
        if self.is_joined() {
            debug!(peer = %self.id(), "join ignored, already joined");
            return Ok(());
        }

        let now = self.net.timestamp();
        self.directory.register_self(aoi.center)?;
        self.self_node.aoi = aoi;
        self.self_node.time = now;
        self.self_node.addr = self.net.host_address();
        self.last_announce = now;

        if gateway.id == self.id() {
            self.state = PeerState::Joined;
            info!(peer = %self.id(), position = %aoi.center, "bootstrapped overlay");
            return Ok(());
        }

        self.state = PeerState::Joining;
        self.net.notify_address_mapping(gateway.id, gateway.addr);
        let query = Message::query(self.id(), self.self_node.clone()).with_target(gateway.id);
        let report = self.net.send_message(&query, true);
        if !report.all_delivered() {
            warn!(peer = %self.id(), gateway = %gateway.id, "QUERY to gateway failed");
        }
        info!(peer = %self.id(), gateway = %gateway.id, position = %aoi.center, "joining");
        Ok(())
    }

    /// Leave the overlay, optionally telling neighbors first.
    pub fn leave(&mut self, notify: bool) {
        if self.state == PeerState::Absent {
            return;
        }

        if notify {
            let targets: BTreeSet<NodeId> = self
                .directory
                .ids()
                .into_iter()
                .chain(self.pending.keys().copied())
                .collect();
            if !targets.is_empty() {
                let bye = Message::bye(self.id()).with_targets(targets);
                self.net.send_message(&bye, true);
            }
        }

        self.directory.clear();
        self.candidates.clear();
        self.pending.clear();
        self.requesters.clear();
        self.state = PeerState::Absent;
        info!(peer = %self.id(), "left overlay");
    }

    /// Move to a new AOI and tell every neighbor.
    ///
    /// `send_time` overrides the local clock as the update's timestamp. The
    /// returned area is where self actually ended up, which differs from
    /// `aoi` if the target spot was taken by a neighbor.
    pub fn move_to(&mut self, aoi: Area, send_time: Option<Timestamp>) -> Result<Area> {
        if self.state == PeerState::Absent {
            return Err(Error::NotJoined);
        }

        let reshaped = !self.self_node.aoi.same_shape(&aoi);
        let center = self.avoid_collision(aoi.center);
        self.directory.move_self(center)?;

        let now = self.net.timestamp();
        self.self_node.aoi = aoi.moved_to(center);
        self.self_node.time = send_time.unwrap_or(now);
        self.last_announce = now;

        let (boundary, interior): (Vec<NodeId>, Vec<NodeId>) =
            self.directory.ids().into_iter().partition(|&id| {
                self.directory
                    .geometry()
                    .is_boundary(id, center, self.self_node.aoi.radius)
            });

        let payload = if reshaped {
            Payload::Node(self.self_node.clone())
        } else {
            Payload::Move {
                position: center,
                time: self.self_node.time,
            }
        };
        let (interior_kind, boundary_kind) = if reshaped {
            (MessageKind::MoveFull, MessageKind::MoveFullBoundary)
        } else {
            (MessageKind::Move, MessageKind::MoveBoundary)
        };

        if !interior.is_empty() {
            let msg = Message::new(interior_kind, self.id(), payload.clone()).with_targets(interior);
            self.send(&msg);
        }
        if !boundary.is_empty() {
            let msg = Message::new(boundary_kind, self.id(), payload).with_targets(boundary);
            self.send(&msg);
        }

        Ok(self.self_node.aoi)
    }

    /// Run one protocol round.
    pub fn tick(&mut self) {
        while let Some(msg) = self.net.receive_message() {
            self.handle_message(msg);
        }
        if self.state == PeerState::Absent {
            return;
        }
        if self.state == PeerState::Joining && !self.directory.is_empty() {
            self.state = PeerState::Joined;
            info!(peer = %self.id(), neighbors = self.directory.len(), "joined overlay");
        }

        self.send_keep_alive();
        self.contact_new_neighbors();
        self.check_neighbor_discovery();
        self.remove_non_overlapped();
        self.expire_pending();
    }

    /// Handle a single inbound message. Returns false if it was ignored
    /// outright (peer absent or payload malformed).
    pub fn handle_message(&mut self, msg: Message) -> bool {
        if self.state == PeerState::Absent {
            return false;
        }
        if let Err(e) = msg.validate() {
            warn!(peer = %self.id(), from = %msg.from, error = %e, "dropping message");
            return false;
        }

        debug!(peer = %self.id(), from = %msg.from, kind = %msg.kind, "handling message");
        let from = msg.from;
        match (msg.kind, msg.payload) {
            (MessageKind::Query, Payload::Node(joiner)) => self.on_query(from, joiner),
            (MessageKind::Hello, Payload::Hello { node, enclosing }) => {
                self.on_hello(from, node, enclosing)
            }
            (MessageKind::En, Payload::Ids { ids, .. }) => self.reconcile_enclosing(from, ids),
            (MessageKind::HelloResponse, Payload::Position(position)) => {
                self.on_hello_response(from, position)
            }
            (kind, payload) if kind.is_move() => self.on_move(kind, from, payload),
            (MessageKind::Node, Payload::Nodes { nodes, .. }) => self.on_nodes(nodes),
            (MessageKind::Bye | MessageKind::Disconnect, _) => self.on_bye(from),
            // validate() already rejected every other pairing.
            _ => return false,
        }
        true
    }

    fn now(&self) -> Timestamp {
        self.net.timestamp()
    }

    /// Eviction grace period in timestamp units.
    fn grace(&self) -> Timestamp {
        to_timestamp_units(self.config.drop_grace, self.net.timestamps_per_second())
    }

    /// Liveness window in timestamp units.
    fn timely_window(&self) -> Timestamp {
        to_timestamp_units(self.config.timely_period, self.net.timestamps_per_second())
    }

    /// Self or a known neighbor.
    fn lookup(&self, id: NodeId) -> Option<&Node> {
        if id == self.id() {
            Some(&self.self_node)
        } else {
            self.directory.get(id)
        }
    }

    /// Relevance between two registered nodes in the local diagram.
    fn relevant(&self, a: NodeId, b: NodeId, buffer: f64) -> bool {
        match (self.lookup(a), self.lookup(b)) {
            (Some(a), Some(b)) => is_relevant(
                self.directory.geometry(),
                a,
                b,
                buffer,
                self.config.tolerant_overlap(),
            ),
            _ => false,
        }
    }

    /// Whether `id` has been heard from within the liveness window.
    fn is_timely(&self, id: NodeId) -> bool {
        if id == self.id() {
            return true;
        }
        self.directory
            .last_seen(id)
            .is_some_and(|seen| self.now().saturating_sub(seen) <= self.timely_window())
    }

    /// Nudge `pos` off any neighbor's exact position.
    fn avoid_collision(&self, mut pos: Position) -> Position {
        while self
            .directory
            .nodes()
            .any(|n| n.position().approx_eq(&pos))
        {
            // Unit steps stop registering once x outgrows f64 integer precision.
            pos.x += (pos.x.abs() * f64::EPSILON).max(1.0);
        }
        pos
    }

    /// Insert a node, or update it if already known.
    ///
    /// `direct` marks a record that came from the node itself, which counts
    /// as hearing from it. Gossiped copies never refresh liveness.
    fn insert_or_update(&mut self, node: Node, direct: bool) -> bool {
        let id = node.id;
        let now = self.now();
        let result = if self.directory.contains(id) {
            if direct {
                self.directory.touch(id, now);
            }
            self.directory.update(node)
        } else {
            let addr = node.addr;
            let deadline = now.saturating_add(self.grace());
            let inserted = self.directory.insert(node, now, deadline);
            if matches!(inserted, Ok(true)) {
                self.net.notify_address_mapping(id, addr);
            }
            inserted
        };
        match result {
            Ok(changed) => changed,
            Err(e) => {
                warn!(peer = %self.id(), neighbor = %id, error = %e, "rejected neighbor record");
                false
            }
        }
    }

    /// Send a message, evicting any target the transport could not reach.
    fn send(&mut self, msg: &Message) -> usize {
        if msg.targets.is_empty() {
            return 0;
        }
        let report = self.net.send_message(msg, true);
        for id in report.failed {
            debug!(peer = %self.id(), target = %id, kind = %msg.kind, "send failed, evicting");
            self.pending.remove(&id);
            self.requesters.remove(&id);
            self.directory.remove(id);
        }
        report.bytes_sent
    }

    /// Send the full records of `ids` to `target` as one NODE message.
    fn send_nodes(&mut self, target: NodeId, ids: &[NodeId]) {
        let nodes: Vec<Node> = ids.iter().filter_map(|&id| self.lookup(id).cloned()).collect();
        let msg = Message::nodes(self.id(), nodes).with_target(target);
        self.send(&msg);
    }

    /// Tell `target` what we think its enclosing neighbors are.
    fn send_en(&mut self, target: NodeId) {
        let ids = self.directory.geometry().enclosing_neighbors(target);
        let msg = Message::enclosing(self.id(), ids).with_target(target);
        self.send(&msg);
    }
}
