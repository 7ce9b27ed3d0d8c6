//! Per-message handlers.

use std::collections::BTreeSet;

use tracing::{debug, trace};
use von_geometry::{GeometryOracle, Position};

use super::VonPeer;
use crate::knowledge::DiscoveryKnowledge;
use crate::message::{Message, MessageKind, Payload};
use crate::network::NetworkPort;
use crate::node::{Node, NodeId};

impl<N: NetworkPort, G: GeometryOracle + Clone> VonPeer<N, G> {
    /// Route a joiner toward the owner of its position, or accept it.
    pub(super) fn on_query(&mut self, from: NodeId, joiner: Node) {
        if joiner.id == self.id() {
            return;
        }

        let center = joiner.position();
        let geometry = self.directory.geometry();
        let closest = geometry.closest_to(center);
        if let Some(next) = closest {
            if !geometry.contains(self.id(), center) && next != self.id() && next != from {
                trace!(peer = %self.id(), joiner = %joiner.id, next = %next, "forwarding QUERY");
                let msg = Message::query(self.id(), joiner).with_target(next);
                self.send(&msg);
                return;
            }
        }

        let joiner_id = joiner.id;
        let direct = from == joiner_id;
        if !self.insert_or_update(joiner, direct) && !self.directory.contains(joiner_id) {
            return;
        }

        // Candidates include self: the joiner needs at least us to get going.
        let buffer = self.config.aoi_buffer;
        let mut candidates = vec![self.id()];
        candidates.extend(self.directory.ids());
        let relevant: Vec<NodeId> = candidates
            .into_iter()
            .filter(|&id| id != joiner_id)
            .filter(|&id| self.relevant(id, joiner_id, buffer) && self.is_timely(id))
            .collect();

        debug!(peer = %self.id(), joiner = %joiner_id, count = relevant.len(), "accepted joiner");
        self.send_nodes(joiner_id, &relevant);
    }

    pub(super) fn on_hello(&mut self, from: NodeId, node: Node, enclosing: Vec<NodeId>) {
        if from == self.id() {
            return;
        }
        if !self.insert_or_update(node, true) && !self.directory.contains(from) {
            return;
        }
        // A HELLO is as good as a HELLO_R for anything we were about to contact.
        self.pending.remove(&from);

        let reply = Message::hello_response(self.id(), self.self_node.position()).with_target(from);
        self.send(&reply);

        self.check_consistency(Some(from));
        self.reconcile_enclosing(from, enclosing);
    }

    /// Compare `from`'s claimed view of our enclosing neighbors against ours,
    /// and send back any we know of that it is missing and should care about.
    pub(super) fn reconcile_enclosing(&mut self, from: NodeId, claimed: Vec<NodeId>) {
        if !self.directory.contains(from) {
            trace!(peer = %self.id(), from = %from, "EN from unknown sender");
            return;
        }

        let claimed: BTreeSet<NodeId> = claimed.into_iter().collect();
        self.directory
            .replace_knowledge(from, DiscoveryKnowledge::from_claimed(claimed.iter().copied()));

        let buffer = self.config.aoi_buffer;
        let missing: Vec<NodeId> = self
            .directory
            .geometry()
            .enclosing_neighbors(self.id())
            .into_iter()
            .filter(|&id| id != from && !claimed.contains(&id))
            .filter(|&id| self.relevant(id, from, buffer))
            .collect();

        if !missing.is_empty() {
            debug!(peer = %self.id(), to = %from, count = missing.len(), "sending missing enclosing neighbors");
            self.send_nodes(from, &missing);
        }
    }

    pub(super) fn on_hello_response(&mut self, from: NodeId, position: Position) {
        let Some(pending) = self.pending.remove(&from) else {
            trace!(peer = %self.id(), from = %from, "HELLO_R without pending HELLO");
            return;
        };
        let mut node = pending.node;
        node.aoi.center = position;
        self.insert_or_update(node, true);
    }

    pub(super) fn on_move(&mut self, kind: MessageKind, from: NodeId, payload: Payload) {
        let Some(current) = self.directory.get(from) else {
            trace!(peer = %self.id(), from = %from, kind = %kind, "move from unknown neighbor");
            return;
        };

        let node = match payload {
            Payload::Node(node) if node.id == from => node,
            Payload::Move { position, time } => {
                let mut node = current.clone();
                node.aoi.center = position;
                node.time = time;
                node
            }
            _ => {
                debug!(peer = %self.id(), from = %from, kind = %kind, "move carries someone else's node");
                return;
            }
        };

        let now = self.now();
        self.directory.touch(from, now);
        match self.directory.update(node) {
            Ok(true) => {
                if kind.requests_discovery() {
                    self.requesters.insert(from);
                }
            }
            Ok(false) => {}
            Err(e) => debug!(peer = %self.id(), from = %from, error = %e, "rejected move"),
        }
    }

    /// Stage gossiped nodes for the next contact pass.
    pub(super) fn on_nodes(&mut self, nodes: Vec<Node>) {
        let self_id = self.id();
        for node in nodes.into_iter().filter(|n| n.id != self_id) {
            let fresher = self
                .candidates
                .get(&node.id)
                .map_or(true, |staged| node.is_newer_than(staged));
            if fresher {
                self.candidates.insert(node.id, node);
            }
        }
    }

    pub(super) fn on_bye(&mut self, from: NodeId) {
        self.pending.remove(&from);
        if !self.directory.contains(from) {
            return;
        }
        self.check_consistency(Some(from));
        self.requesters.remove(&from);
        self.directory.remove(from);
        debug!(peer = %self.id(), neighbor = %from, "neighbor left");
    }
}
