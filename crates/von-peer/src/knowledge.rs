//! What a neighbor is believed to already know about its own neighbors.
//!
//! Purely advisory: used to avoid re-announcing the same node to the same
//! neighbor on every discovery pass.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use crate::node::NodeId;

/// Relationship flags between a neighbor and the checked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct NeighborState(u8);

impl NeighborState {
    pub const NONE: Self = Self(0);
    /// The neighbor's site lies inside the checked node's AOI.
    pub const OVERLAPPED: Self = Self(1);
    /// The neighbor is an enclosing neighbor of the checked node.
    pub const ENCLOSED: Self = Self(2);

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0 && flag.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether moving from `known` to `self` is news worth announcing.
    ///
    /// Nothing is announced once the node is known to overlap. Otherwise a
    /// fresh overlap, or becoming enclosed when that wasn't known, triggers it.
    pub fn is_news_against(self, known: Self) -> bool {
        if known.contains(Self::OVERLAPPED) {
            return false;
        }
        self.contains(Self::OVERLAPPED)
            || (self.contains(Self::ENCLOSED) && !known.contains(Self::ENCLOSED))
    }
}

impl BitOr for NeighborState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for NeighborState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Per-neighbor view: node id to the flags it was last seen with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryKnowledge {
    states: BTreeMap<NodeId, NeighborState>,
}

impl DiscoveryKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Knowledge implied by a neighbor's own enclosing list: it already knows
    /// every one of them.
    pub fn from_claimed<I: IntoIterator<Item = NodeId>>(ids: I) -> Self {
        ids.into_iter()
            .map(|id| (id, NeighborState::OVERLAPPED))
            .collect()
    }

    pub fn get(&self, id: NodeId) -> NeighborState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    pub fn set(&mut self, id: NodeId, state: NeighborState) {
        self.states.insert(id, state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl FromIterator<(NodeId, NeighborState)> for DiscoveryKnowledge {
    fn from_iter<T: IntoIterator<Item = (NodeId, NeighborState)>>(iter: T) -> Self {
        Self {
            states: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use von_geometry::SiteId;

    const O: NeighborState = NeighborState::OVERLAPPED;
    const E: NeighborState = NeighborState::ENCLOSED;
    const NONE: NeighborState = NeighborState::NONE;

    #[test]
    fn flags_combine() {
        let both = O | E;
        assert!(both.contains(O));
        assert!(both.contains(E));
        assert!(!E.contains(O));
        assert!(!NONE.contains(NONE));
        assert!(NONE.is_empty());
    }

    #[test]
    fn news_rule() {
        // New overlap is always news unless overlap was already known.
        assert!(O.is_news_against(NONE));
        assert!(O.is_news_against(E));
        assert!(!O.is_news_against(O));
        assert!(!(O | E).is_news_against(O));

        // Becoming enclosed is news only the first time.
        assert!(E.is_news_against(NONE));
        assert!(!E.is_news_against(E));
        assert!(!E.is_news_against(O | E));
    }

    #[test]
    fn claimed_ids_count_as_overlapped() {
        let knowledge = DiscoveryKnowledge::from_claimed([SiteId(3), SiteId(5)]);
        assert_eq!(knowledge.len(), 2);
        assert_eq!(knowledge.get(SiteId(3)), O);
        assert_eq!(knowledge.get(SiteId(4)), NONE);
    }

    fn any_state() -> impl Strategy<Value = NeighborState> {
        (0u8..4).prop_map(NeighborState)
    }

    proptest! {
        #[test]
        fn recorded_state_is_never_news_again(current in any_state(), known in any_state()) {
            prop_assert!(!current.is_news_against(current | known));
        }
    }
}
