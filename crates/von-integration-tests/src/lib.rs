//! In-process simulation harness for VON peers.
//!
//! A [`Hub`] stands in for the network: every message is encoded to bytes on
//! send and decoded on receive, so the codec is exercised on every hop. A
//! [`World`] owns a set of peers sharing one hub and one clock, ticks them in
//! id order, and checks the overlay invariants against a global diagram.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::sync::Once;

use tracing::{debug, warn};
use von_geometry::{GeometryOracle, Position, SiteId, Voronoi};
use von_peer::{
    Area, Message, NetworkPort, Node, NodeId, Result, SendReport, Timestamp, VonConfig, VonPeer,
};

/// Simulated ticks per second.
pub const TICKS_PER_SECOND: u64 = 10;

/// Radius around the world center inside which every peer's clipping box is
/// guaranteed to reach, for worlds that fit in `[0, 1000]²`.
const CHECKED_REGION: f64 = 5_000.0;

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Address a simulated peer listens on.
pub fn sim_addr(id: NodeId) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 10_000 + (id.0 % 50_000) as u16)
}

/// Shared mailbox and clock.
#[derive(Debug, Default)]
pub struct Hub {
    now: Timestamp,
    mailboxes: HashMap<NodeId, VecDeque<Vec<u8>>>,
    bytes_sent: usize,
    messages_sent: usize,
}

impl Hub {
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn advance(&mut self) {
        self.now += 1;
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    fn attach(&mut self, id: NodeId) {
        self.mailboxes.entry(id).or_default();
    }

    /// Drop a peer's mailbox; later sends to it fail.
    fn detach(&mut self, id: NodeId) {
        self.mailboxes.remove(&id);
    }

    fn deliver(&mut self, to: NodeId, bytes: &[u8]) -> bool {
        match self.mailboxes.get_mut(&to) {
            Some(queue) => {
                queue.push_back(bytes.to_vec());
                self.bytes_sent += bytes.len();
                self.messages_sent += 1;
                true
            }
            None => false,
        }
    }

    fn take(&mut self, id: NodeId) -> Option<Vec<u8>> {
        self.mailboxes.get_mut(&id)?.pop_front()
    }
}

/// One peer's view of the hub.
#[derive(Debug)]
pub struct SimPort {
    id: NodeId,
    hub: Rc<RefCell<Hub>>,
    routes: HashMap<NodeId, SocketAddr>,
}

impl SimPort {
    pub fn new(id: NodeId, hub: Rc<RefCell<Hub>>) -> Self {
        hub.borrow_mut().attach(id);
        Self {
            id,
            hub,
            routes: HashMap::new(),
        }
    }
}

impl NetworkPort for SimPort {
    fn send_message(&mut self, msg: &Message, _reliable: bool) -> SendReport {
        let bytes = match msg.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(peer = %self.id, error = %e, "encode failed");
                return SendReport {
                    bytes_sent: 0,
                    failed: msg.targets.clone(),
                };
            }
        };

        let mut report = SendReport::default();
        let mut hub = self.hub.borrow_mut();
        for &target in &msg.targets {
            if self.routes.contains_key(&target) && hub.deliver(target, &bytes) {
                report.bytes_sent += bytes.len();
            } else {
                report.failed.push(target);
            }
        }
        report
    }

    fn receive_message(&mut self) -> Option<Message> {
        loop {
            let bytes = self.hub.borrow_mut().take(self.id)?;
            match Message::from_bytes(&bytes) {
                Ok(msg) => return Some(msg),
                Err(e) => warn!(peer = %self.id, error = %e, "undecodable message"),
            }
        }
    }

    fn notify_address_mapping(&mut self, id: NodeId, addr: SocketAddr) -> bool {
        self.routes.insert(id, addr);
        true
    }

    fn host_address(&self) -> SocketAddr {
        sim_addr(self.id)
    }

    fn timestamp(&self) -> Timestamp {
        self.hub.borrow().now()
    }

    fn timestamps_per_second(&self) -> u64 {
        TICKS_PER_SECOND
    }
}

pub type SimPeer = VonPeer<SimPort>;

/// A set of peers on one hub.
pub struct World {
    hub: Rc<RefCell<Hub>>,
    config: VonConfig,
    peers: BTreeMap<NodeId, SimPeer>,
    gateway: Option<Node>,
}

impl World {
    pub fn new(config: VonConfig) -> Self {
        Self {
            hub: Rc::new(RefCell::new(Hub::default())),
            config,
            peers: BTreeMap::new(),
            gateway: None,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.hub.borrow().now()
    }

    pub fn hub(&self) -> std::cell::Ref<'_, Hub> {
        self.hub.borrow()
    }

    /// Create a peer and join it through the gateway. The first peer spawned
    /// becomes the gateway.
    pub fn spawn(&mut self, id: u64, position: Position, radius: f64) -> Result<NodeId> {
        let id = SiteId(id);
        let port = SimPort::new(id, Rc::clone(&self.hub));
        let mut peer = VonPeer::new(id, port, self.config.clone())?;
        let aoi = Area::circle(position, radius);

        let gateway = match &self.gateway {
            Some(gateway) => gateway.clone(),
            None => {
                let node = Node::new(id, aoi, self.now(), sim_addr(id));
                self.gateway = Some(node.clone());
                node
            }
        };
        peer.join(aoi, &gateway)?;
        debug!(peer = %id, position = %position, "spawned");
        self.peers.insert(id, peer);
        Ok(id)
    }

    /// Advance the clock and tick every peer once, in id order.
    pub fn tick(&mut self) {
        self.hub.borrow_mut().advance();
        for peer in self.peers.values_mut() {
            peer.tick();
        }
    }

    pub fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn move_peer(&mut self, id: NodeId, position: Position) -> Result<Area> {
        let peer = self.peers.get_mut(&id).ok_or(von_peer::Error::NotJoined)?;
        let aoi = peer.self_node().aoi.moved_to(position);
        peer.move_to(aoi, None)
    }

    /// Leave gracefully.
    pub fn leave(&mut self, id: NodeId) {
        if let Some(mut peer) = self.peers.remove(&id) {
            peer.leave(true);
        }
        self.hub.borrow_mut().detach(id);
    }

    /// Vanish without a word.
    pub fn kill(&mut self, id: NodeId) {
        self.peers.remove(&id);
        self.hub.borrow_mut().detach(id);
    }

    pub fn peer(&self, id: NodeId) -> Option<&SimPeer> {
        self.peers.get(&id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &SimPeer> {
        self.peers.values()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.peers.keys().copied().collect()
    }

    /// Diagram over every live peer's true position.
    pub fn global_diagram(&self) -> Voronoi {
        Voronoi::from_sites(
            self.peers
                .values()
                .map(|p| (p.id(), p.self_node().position())),
        )
    }

    /// Enclosing pairs `(a, b)` where `a` does not know `b`.
    pub fn missing_enclosing(&self) -> Vec<(NodeId, NodeId)> {
        let diagram = self.global_diagram();
        let center = Position::new(500.0, 500.0);
        let mut missing = Vec::new();
        for edge in diagram.edges() {
            if !edge.segment.touches_disc(&center, CHECKED_REGION) {
                continue;
            }
            for (a, b) in [(edge.a, edge.b), (edge.b, edge.a)] {
                if !self.knows(a, b) {
                    missing.push((a, b));
                }
            }
        }
        missing
    }

    /// Pairs `(a, b)` where `b` stands inside `a`'s AOI but `a` does not know it.
    pub fn missing_overlaps(&self) -> Vec<(NodeId, NodeId)> {
        let mut missing = Vec::new();
        for a in self.peers.values() {
            for b in self.peers.values() {
                if a.id() != b.id()
                    && a.self_node().aoi.covers(&b.self_node().position())
                    && !a.is_neighbor(b.id())
                {
                    missing.push((a.id(), b.id()));
                }
            }
        }
        missing
    }

    fn knows(&self, a: NodeId, b: NodeId) -> bool {
        self.peers.get(&a).is_some_and(|p| p.is_neighbor(b))
    }
}
