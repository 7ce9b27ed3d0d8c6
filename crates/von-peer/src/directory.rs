//! Neighbor records kept in lock-step with the geometry.
//!
//! The directory is the only owner of the geometry oracle. Every mutation goes
//! through [`NeighborDirectory::insert`], [`NeighborDirectory::update`] or
//! [`NeighborDirectory::remove`], so the set of neighbor ids and the set of
//! registered sites (minus self) can never drift apart.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;
use von_geometry::{GeometryError, GeometryOracle, Position, Voronoi};

use crate::knowledge::DiscoveryKnowledge;
use crate::node::{Node, NodeId, Timestamp};

/// How a neighbor changed since the application last looked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Inserted,
    Updated,
    Deleted,
}

/// Known neighbors and the diagram over them.
#[derive(Debug, Clone)]
pub struct NeighborDirectory<G: GeometryOracle = Voronoi> {
    self_id: NodeId,
    geometry: G,
    nodes: BTreeMap<NodeId, Node>,
    last_seen: HashMap<NodeId, Timestamp>,
    knowledge: HashMap<NodeId, DiscoveryKnowledge>,
    deadlines: HashMap<NodeId, Timestamp>,
    status: BTreeMap<NodeId, UpdateStatus>,
}

impl<G: GeometryOracle> NeighborDirectory<G> {
    pub fn new(self_id: NodeId, geometry: G) -> Self {
        Self {
            self_id,
            geometry,
            nodes: BTreeMap::new(),
            last_seen: HashMap::new(),
            knowledge: HashMap::new(),
            deadlines: HashMap::new(),
            status: BTreeMap::new(),
        }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    /// Register our own site, or move it if already registered.
    pub fn register_self(&mut self, position: Position) -> Result<(), GeometryError> {
        if self.geometry.get(self.self_id).is_some() {
            self.geometry.update(self.self_id, position)
        } else {
            self.geometry.insert(self.self_id, position)
        }
    }

    /// Move our own site.
    pub fn move_self(&mut self, position: Position) -> Result<(), GeometryError> {
        self.geometry.update(self.self_id, position)
    }

    /// Add a neighbor. Returns `Ok(false)` if it is self or already known.
    ///
    /// The eviction deadline starts at `deadline`.
    pub fn insert(
        &mut self,
        node: Node,
        now: Timestamp,
        deadline: Timestamp,
    ) -> Result<bool, GeometryError> {
        if node.id == self.self_id || self.nodes.contains_key(&node.id) {
            return Ok(false);
        }
        self.geometry.insert(node.id, node.position())?;

        let id = node.id;
        trace!(neighbor = %id, position = %node.position(), "inserted neighbor");
        self.nodes.insert(id, node);
        self.last_seen.insert(id, now);
        self.knowledge.insert(id, DiscoveryKnowledge::new());
        self.deadlines.insert(id, deadline);
        self.status.insert(id, UpdateStatus::Inserted);
        Ok(true)
    }

    /// Replace a neighbor's record with newer info.
    ///
    /// Returns `Ok(false)` if the neighbor is unknown or `node` is older than
    /// what we hold. Liveness is not refreshed; see [`Self::touch`].
    pub fn update(&mut self, node: Node) -> Result<bool, GeometryError> {
        let Some(current) = self.nodes.get(&node.id) else {
            return Ok(false);
        };
        if node.is_stale_against(current) {
            trace!(neighbor = %node.id, time = node.time, held = current.time, "stale update");
            return Ok(false);
        }
        self.geometry.update(node.id, node.position())?;

        let id = node.id;
        self.nodes.insert(id, node);
        if self.status.get(&id) != Some(&UpdateStatus::Inserted) {
            self.status.insert(id, UpdateStatus::Updated);
        }
        Ok(true)
    }

    /// Drop a neighbor everywhere. Returns false if it wasn't known.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if self.nodes.remove(&id).is_none() {
            return false;
        }
        // Cannot fail: every node in the map has a site.
        let _ = self.geometry.remove(id);
        self.last_seen.remove(&id);
        self.knowledge.remove(&id);
        self.deadlines.remove(&id);
        self.status.insert(id, UpdateStatus::Deleted);
        trace!(neighbor = %id, "removed neighbor");
        true
    }

    /// Forget everything, self's site included.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.nodes.clear();
        self.last_seen.clear();
        self.knowledge.clear();
        self.deadlines.clear();
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Neighbor ids, ascending.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// Record that a known neighbor spoke to us directly.
    pub fn touch(&mut self, id: NodeId, now: Timestamp) {
        if let Some(seen) = self.last_seen.get_mut(&id) {
            *seen = now;
        }
    }

    /// When we last heard from a neighbor.
    pub fn last_seen(&self, id: NodeId) -> Option<Timestamp> {
        self.last_seen.get(&id).copied()
    }

    pub fn knowledge(&self, id: NodeId) -> Option<&DiscoveryKnowledge> {
        self.knowledge.get(&id)
    }

    /// Replace what we believe `id` knows. Ignored for unknown ids.
    pub fn replace_knowledge(&mut self, id: NodeId, knowledge: DiscoveryKnowledge) {
        if let Some(slot) = self.knowledge.get_mut(&id) {
            *slot = knowledge;
        }
    }

    pub fn deadline(&self, id: NodeId) -> Option<Timestamp> {
        self.deadlines.get(&id).copied()
    }

    pub fn refresh_deadline(&mut self, id: NodeId, deadline: Timestamp) {
        if let Some(slot) = self.deadlines.get_mut(&id) {
            *slot = deadline;
        }
    }

    /// Drain the per-neighbor change record.
    pub fn take_update_status(&mut self) -> BTreeMap<NodeId, UpdateStatus> {
        std::mem::take(&mut self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Area;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use von_geometry::SiteId;

    fn test_node(id: u64, x: f64, y: f64, time: Timestamp) -> Node {
        Node::new(
            SiteId(id),
            Area::circle(Position::new(x, y), 50.0),
            time,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000 + id as u16),
        )
    }

    fn directory() -> NeighborDirectory {
        let mut dir = NeighborDirectory::new(SiteId(1), Voronoi::new());
        dir.register_self(Position::ORIGIN).unwrap();
        dir
    }

    #[test]
    fn insert_registers_a_site() {
        let mut dir = directory();
        assert!(dir.insert(test_node(2, 10.0, 0.0, 1), 1, 21).unwrap());
        assert!(dir.contains(SiteId(2)));
        assert_eq!(dir.geometry().get(SiteId(2)), Some(Position::new(10.0, 0.0)));
        assert_eq!(dir.geometry().len(), 2);
        assert_eq!(dir.deadline(SiteId(2)), Some(21));
        assert_eq!(dir.last_seen(SiteId(2)), Some(1));
        assert!(dir.knowledge(SiteId(2)).is_some_and(|k| k.is_empty()));
    }

    #[test]
    fn duplicate_and_self_inserts_are_ignored() {
        let mut dir = directory();
        assert!(dir.insert(test_node(2, 10.0, 0.0, 1), 0, 0).unwrap());
        assert!(!dir.insert(test_node(2, 20.0, 0.0, 2), 0, 0).unwrap());
        assert!(!dir.insert(test_node(1, 5.0, 5.0, 2), 0, 0).unwrap());
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.geometry().len(), 2);
        assert_eq!(dir.get(SiteId(2)).map(|n| n.time), Some(1));
    }

    #[test]
    fn update_is_monotonic() {
        let mut dir = directory();
        dir.insert(test_node(2, 10.0, 0.0, 5), 0, 0).unwrap();

        assert!(!dir.update(test_node(2, 99.0, 0.0, 4)).unwrap());
        assert_eq!(dir.geometry().get(SiteId(2)), Some(Position::new(10.0, 0.0)));

        assert!(dir.update(test_node(2, 30.0, 0.0, 5)).unwrap());
        assert_eq!(dir.geometry().get(SiteId(2)), Some(Position::new(30.0, 0.0)));

        assert!(!dir.update(test_node(9, 0.0, 0.0, 9)).unwrap());
    }

    #[test]
    fn only_touch_refreshes_liveness() {
        let mut dir = directory();
        dir.insert(test_node(2, 10.0, 0.0, 1), 3, 0).unwrap();

        assert!(dir.update(test_node(2, 20.0, 0.0, 2)).unwrap());
        assert_eq!(dir.last_seen(SiteId(2)), Some(3));

        dir.touch(SiteId(2), 8);
        assert_eq!(dir.last_seen(SiteId(2)), Some(8));

        dir.touch(SiteId(9), 8);
        assert!(dir.last_seen(SiteId(9)).is_none());
    }

    #[test]
    fn remove_clears_every_map() {
        let mut dir = directory();
        dir.insert(test_node(2, 10.0, 0.0, 1), 0, 20).unwrap();
        assert!(dir.remove(SiteId(2)));
        assert!(!dir.remove(SiteId(2)));
        assert!(dir.get(SiteId(2)).is_none());
        assert!(dir.geometry().get(SiteId(2)).is_none());
        assert!(dir.knowledge(SiteId(2)).is_none());
        assert!(dir.deadline(SiteId(2)).is_none());
        assert!(dir.last_seen(SiteId(2)).is_none());
        // Self stays registered.
        assert_eq!(dir.geometry().len(), 1);
    }

    #[test]
    fn non_finite_positions_leave_no_trace() {
        let mut dir = directory();
        assert!(dir.insert(test_node(2, f64::NAN, 0.0, 1), 0, 0).is_err());
        assert!(!dir.contains(SiteId(2)));
        assert_eq!(dir.geometry().len(), 1);
    }

    #[test]
    fn update_status_keeps_inserted() {
        let mut dir = directory();
        dir.insert(test_node(2, 10.0, 0.0, 1), 0, 0).unwrap();
        dir.update(test_node(2, 11.0, 0.0, 2)).unwrap();
        dir.insert(test_node(3, 0.0, 10.0, 1), 0, 0).unwrap();

        let status = dir.take_update_status();
        assert_eq!(status.get(&SiteId(2)), Some(&UpdateStatus::Inserted));
        assert_eq!(status.get(&SiteId(3)), Some(&UpdateStatus::Inserted));

        dir.update(test_node(2, 12.0, 0.0, 3)).unwrap();
        dir.remove(SiteId(3));
        let status = dir.take_update_status();
        assert_eq!(status.get(&SiteId(2)), Some(&UpdateStatus::Updated));
        assert_eq!(status.get(&SiteId(3)), Some(&UpdateStatus::Deleted));
        assert!(dir.take_update_status().is_empty());
    }

    #[test]
    fn knowledge_only_for_known_ids() {
        let mut dir = directory();
        dir.insert(test_node(2, 10.0, 0.0, 1), 0, 0).unwrap();
        dir.replace_knowledge(SiteId(2), DiscoveryKnowledge::from_claimed([SiteId(7)]));
        dir.replace_knowledge(SiteId(9), DiscoveryKnowledge::from_claimed([SiteId(7)]));
        assert_eq!(dir.knowledge(SiteId(2)).map(|k| k.len()), Some(1));
        assert!(dir.knowledge(SiteId(9)).is_none());
    }
}
