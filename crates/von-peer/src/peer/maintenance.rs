//! Maintenance passes, run once per tick after the inbox is drained.

use std::collections::BTreeSet;

use tracing::{debug, trace, warn};
use von_geometry::{GeometryOracle, Position};

use super::{is_relevant, PendingNeighbor, VonPeer};
use crate::config::{DiscoveryMode, DiscoveryPruning, DiscoveryScope};
use crate::knowledge::{DiscoveryKnowledge, NeighborState};
use crate::message::Message;
use crate::network::NetworkPort;
use crate::node::NodeId;

impl<N: NetworkPort, G: GeometryOracle + Clone> VonPeer<N, G> {
    /// Re-announce our position if we've been quiet for half the liveness window.
    pub(super) fn send_keep_alive(&mut self) {
        if !self.is_joined() {
            return;
        }
        let quiet = self.now().saturating_sub(self.last_announce);
        if quiet < self.timely_window() / 2 {
            return;
        }
        trace!(peer = %self.id(), quiet, "keep-alive");
        if let Err(e) = self.move_to(self.self_node.aoi, None) {
            warn!(peer = %self.id(), error = %e, "keep-alive failed");
        }
    }

    /// Say HELLO to gossiped nodes that are relevant to us.
    ///
    /// Relevance is judged on a copy of the diagram with every candidate
    /// added, so candidates can shadow each other the same way they will once
    /// they are real neighbors.
    pub(super) fn contact_new_neighbors(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        let candidates = std::mem::take(&mut self.candidates);

        let mut trial = self.directory.geometry().clone();
        let mut fresh = Vec::new();
        for (id, node) in candidates {
            if id == self.id() {
                continue;
            }
            if self.directory.contains(id) {
                self.insert_or_update(node, false);
                continue;
            }
            match trial.insert(id, node.position()) {
                Ok(()) => fresh.push(node),
                Err(e) => debug!(peer = %self.id(), candidate = %id, error = %e, "skipping candidate"),
            }
        }

        let now = self.now();
        let buffer = self.config.aoi_buffer;
        let tolerant = self.config.tolerant_overlap();
        for node in fresh {
            if !is_relevant(&trial, &node, &self.self_node, buffer, tolerant) {
                continue;
            }
            let enclosing = trial.enclosing_neighbors(node.id);
            let target = node.id;
            self.net.notify_address_mapping(target, node.addr);
            self.pending
                .entry(target)
                .and_modify(|p| p.node = node.clone())
                .or_insert(PendingNeighbor { node, since: now });

            trace!(peer = %self.id(), target = %target, "sending HELLO");
            let hello = Message::hello(self.id(), self.self_node.clone(), enclosing).with_target(target);
            self.send(&hello);
        }
    }

    /// Tell neighbors about nodes that newly became relevant to them.
    pub(super) fn check_neighbor_discovery(&mut self) {
        let requesters = std::mem::take(&mut self.requesters);
        let checked: Vec<NodeId> = match self.config.discovery_mode {
            DiscoveryMode::Requesters => requesters.into_iter().collect(),
            DiscoveryMode::AllNeighbors => self.directory.ids(),
        };
        if checked.is_empty() {
            return;
        }

        let scope: Vec<NodeId> = match self.config.discovery_scope {
            DiscoveryScope::EnclosingOnly => self.directory.geometry().enclosing_neighbors(self.id()),
            DiscoveryScope::AllNeighbors => self.directory.ids(),
        };

        let buffer = self.config.aoi_buffer;
        let tolerant = self.config.tolerant_overlap();
        for from in checked {
            let Some(from_node) = self.directory.get(from) else {
                continue;
            };
            let center = from_node.position();
            let radius = from_node.aoi.radius + buffer;
            let known = self.directory.knowledge(from).cloned().unwrap_or_default();
            let geometry = self.directory.geometry();

            let mut fresh = DiscoveryKnowledge::new();
            let mut notify = Vec::new();
            for &id in &scope {
                if id == self.id() || id == from {
                    continue;
                }
                let mut state = NeighborState::NONE;
                if geometry.overlaps(id, center, radius, tolerant) {
                    state |= NeighborState::OVERLAPPED;
                }
                if geometry.is_enclosing(id, from) {
                    state |= NeighborState::ENCLOSED;
                }
                if state.is_empty() {
                    continue;
                }
                if state.is_news_against(known.get(id)) && !self.is_pruned(center, id) {
                    notify.push(id);
                }
                fresh.set(id, state);
            }

            self.directory.replace_knowledge(from, fresh);
            if !notify.is_empty() {
                debug!(peer = %self.id(), to = %from, count = notify.len(), "announcing discovered neighbors");
                self.send_nodes(from, &notify);
            }
        }
    }

    /// Whether the pruning heuristic suppresses announcing `id` to a
    /// neighbor at `toward`.
    ///
    /// With right-hand pruning only nodes strictly to our right, facing the
    /// neighbor, are announced.
    fn is_pruned(&self, toward: Position, id: NodeId) -> bool {
        match self.config.discovery_pruning {
            DiscoveryPruning::None => false,
            DiscoveryPruning::RightHandSide => {
                let Some(pos) = self.directory.geometry().get(id) else {
                    return true;
                };
                let origin = self.self_node.position();
                (toward - origin).cross(&(pos - origin)) >= 0.0
            }
        }
    }

    /// Send EN to every enclosing neighbor except `skip`.
    pub(super) fn check_consistency(&mut self, skip: Option<NodeId>) {
        let targets = self.directory.geometry().enclosing_neighbors(self.id());
        for target in targets {
            if Some(target) != skip && self.directory.contains(target) {
                self.send_en(target);
            }
        }
    }

    /// Drop neighbors that have stayed irrelevant past their grace period.
    pub(super) fn remove_non_overlapped(&mut self) {
        let now = self.now();
        let deadline = now.saturating_add(self.grace());
        let buffer = self.config.eviction_buffer();
        let enclosing: BTreeSet<NodeId> = self
            .directory
            .geometry()
            .enclosing_neighbors(self.id())
            .into_iter()
            .collect();

        let mut expired = Vec::new();
        for id in self.directory.ids() {
            let keep = enclosing.contains(&id)
                || (self.relevant(self.id(), id, buffer) && self.is_timely(id));
            if keep {
                self.directory.refresh_deadline(id, deadline);
            } else if self.directory.deadline(id).map_or(true, |d| now >= d) {
                expired.push(id);
            }
        }
        if expired.is_empty() {
            return;
        }

        debug!(peer = %self.id(), count = expired.len(), "evicting non-overlapped neighbors");
        let bye = Message::bye(self.id()).with_targets(expired.iter().copied());
        self.net.send_message(&bye, true);
        for id in expired {
            self.requesters.remove(&id);
            self.directory.remove(id);
        }
    }

    /// Give up on HELLOs that were never answered.
    pub(super) fn expire_pending(&mut self) {
        let now = self.now();
        let grace = self.grace();
        let before = self.pending.len();
        self.pending
            .retain(|_, p| now.saturating_sub(p.since) < grace);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            trace!(peer = %self.id(), dropped, "expired pending neighbors");
        }
    }
}
