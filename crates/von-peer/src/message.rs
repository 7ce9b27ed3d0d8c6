//! Protocol messages.
//!
//! A message is a kind tag plus a typed payload. The two travel separately so
//! that a mismatched pair (say, a MOVE carrying a node list) can be detected
//! and dropped instead of half-processed.

use serde::{Deserialize, Serialize};
use von_geometry::Position;

use crate::error::{Error, Result};
use crate::node::{Node, NodeId, Timestamp};

/// Message types of the VON protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Remote link went away.
    Disconnect,
    /// Find the acceptor for a joining node.
    Query,
    /// Make a newly learned node mutually aware of us.
    Hello,
    /// Confirms a HELLO with the responder's current position.
    HelloResponse,
    /// The sender's view of the receiver's enclosing neighbors.
    En,
    /// Position update for interior neighbors.
    Move,
    /// Full node update (AOI reshaped) for interior neighbors.
    MoveFull,
    /// Position update for boundary neighbors, requests a discovery check.
    MoveBoundary,
    /// Full node update for boundary neighbors, requests a discovery check.
    MoveFullBoundary,
    /// The sender is dropping its link to us.
    Bye,
    /// Gossip of nodes the receiver should know about.
    Node,
}

impl MessageKind {
    pub fn is_move(self) -> bool {
        matches!(
            self,
            Self::Move | Self::MoveFull | Self::MoveBoundary | Self::MoveFullBoundary
        )
    }

    /// MOVE variants that ask the receiver for a neighbor-discovery check.
    pub fn requests_discovery(self) -> bool {
        matches!(self, Self::MoveBoundary | Self::MoveFullBoundary)
    }

    /// MOVE variants that carry the whole node.
    pub fn carries_full_node(self) -> bool {
        matches!(self, Self::MoveFull | Self::MoveFullBoundary)
    }

    /// Default priority (lower is more urgent).
    pub fn priority(self) -> u8 {
        if self.is_move() {
            1
        } else {
            0
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnect => "DISCONNECT",
            Self::Query => "QUERY",
            Self::Hello => "HELLO",
            Self::HelloResponse => "HELLO_R",
            Self::En => "EN",
            Self::Move => "MOVE",
            Self::MoveFull => "MOVE_F",
            Self::MoveBoundary => "MOVE_B",
            Self::MoveFullBoundary => "MOVE_FB",
            Self::Bye => "BYE",
            Self::Node => "NODE",
        };
        f.write_str(name)
    }
}

/// Typed message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Empty,
    /// A single node (QUERY, MOVE_F, MOVE_FB).
    Node(Node),
    /// Sender's node and its view of the receiver's enclosing neighbors.
    Hello { node: Node, enclosing: Vec<NodeId> },
    /// Bare position (HELLO_R).
    Position(Position),
    /// Counted id list (EN).
    Ids { count: u32, ids: Vec<NodeId> },
    /// Lightweight position update (MOVE, MOVE_B).
    Move { position: Position, time: Timestamp },
    /// Counted node list (NODE).
    Nodes { count: u32, nodes: Vec<Node> },
}

/// A protocol message addressed to one or more peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub from: NodeId,
    pub targets: Vec<NodeId>,
    pub priority: u8,
    pub payload: Payload,
}

impl Message {
    /// Create a message with no targets yet.
    pub fn new(kind: MessageKind, from: NodeId, payload: Payload) -> Self {
        Self {
            kind,
            from,
            targets: Vec::new(),
            priority: kind.priority(),
            payload,
        }
    }

    pub fn query(from: NodeId, joiner: Node) -> Self {
        Self::new(MessageKind::Query, from, Payload::Node(joiner))
    }

    pub fn hello(from: NodeId, node: Node, enclosing: Vec<NodeId>) -> Self {
        Self::new(MessageKind::Hello, from, Payload::Hello { node, enclosing })
    }

    pub fn hello_response(from: NodeId, position: Position) -> Self {
        Self::new(MessageKind::HelloResponse, from, Payload::Position(position))
    }

    pub fn enclosing(from: NodeId, ids: Vec<NodeId>) -> Self {
        let count = ids.len() as u32;
        Self::new(MessageKind::En, from, Payload::Ids { count, ids })
    }

    pub fn nodes(from: NodeId, nodes: Vec<Node>) -> Self {
        let count = nodes.len() as u32;
        Self::new(MessageKind::Node, from, Payload::Nodes { count, nodes })
    }

    pub fn bye(from: NodeId) -> Self {
        Self::new(MessageKind::Bye, from, Payload::Empty)
    }

    /// Set the targets.
    #[must_use]
    pub fn with_targets<I: IntoIterator<Item = NodeId>>(mut self, targets: I) -> Self {
        self.targets = targets.into_iter().collect();
        self
    }

    /// Add a single target.
    #[must_use]
    pub fn with_target(mut self, id: NodeId) -> Self {
        self.targets.push(id);
        self
    }

    /// Check that the payload has the shape the kind requires.
    pub fn validate(&self) -> Result<()> {
        use MessageKind as K;

        let malformed = |reason| Error::MalformedPayload {
            kind: self.kind,
            reason,
        };

        match (self.kind, &self.payload) {
            (K::Query, Payload::Node(_)) => Ok(()),
            (K::MoveFull | K::MoveFullBoundary, Payload::Node(_)) => Ok(()),
            (K::Hello, Payload::Hello { node, .. }) if node.id == self.from => Ok(()),
            (K::Hello, Payload::Hello { .. }) => Err(malformed("node id differs from sender")),
            (K::HelloResponse, Payload::Position(_)) => Ok(()),
            (K::Move | K::MoveBoundary, Payload::Move { .. }) => Ok(()),
            (K::En, Payload::Ids { count, ids }) if *count as usize == ids.len() => Ok(()),
            (K::En, Payload::Ids { .. }) => Err(malformed("id count mismatch")),
            (K::Node, Payload::Nodes { count, nodes }) if *count as usize == nodes.len() => Ok(()),
            (K::Node, Payload::Nodes { .. }) => Err(malformed("node count mismatch")),
            (K::Bye | K::Disconnect, Payload::Empty) => Ok(()),
            _ => Err(malformed("unexpected payload type")),
        }
    }

    /// Serialize to bytes for network transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Area;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use von_geometry::SiteId;

    fn node(id: u64) -> Node {
        Node::new(
            SiteId(id),
            Area::circle(Position::new(10.0, 20.0), 100.0),
            7,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000 + id as u16),
        )
    }

    #[test]
    fn constructors_produce_valid_messages() {
        let from = SiteId(1);
        let msgs = [
            Message::query(from, node(1)),
            Message::hello(from, node(1), vec![SiteId(2)]),
            Message::hello_response(from, Position::ORIGIN),
            Message::enclosing(from, vec![SiteId(2), SiteId(3)]),
            Message::nodes(from, vec![node(2)]),
            Message::bye(from),
        ];
        for msg in msgs {
            assert!(msg.validate().is_ok(), "{} should validate", msg.kind);
        }
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let mut msg = Message::enclosing(SiteId(1), vec![SiteId(2)]);
        if let Payload::Ids { count, .. } = &mut msg.payload {
            *count = 3;
        }
        assert!(matches!(
            msg.validate(),
            Err(Error::MalformedPayload { kind: MessageKind::En, .. })
        ));
    }

    #[test]
    fn kind_payload_mismatch_is_rejected() {
        let msg = Message::new(MessageKind::Move, SiteId(1), Payload::Empty);
        assert!(msg.validate().is_err());

        let spoofed = Message::hello(SiteId(1), node(9), vec![]);
        assert!(spoofed.validate().is_err());
    }

    #[test]
    fn move_priority_is_lower() {
        let mv = Message::new(
            MessageKind::MoveBoundary,
            SiteId(1),
            Payload::Move {
                position: Position::ORIGIN,
                time: 3,
            },
        );
        assert_eq!(mv.priority, 1);
        assert_eq!(Message::bye(SiteId(1)).priority, 0);
        assert!(MessageKind::MoveFullBoundary.requests_discovery());
        assert!(!MessageKind::MoveFull.requests_discovery());
    }

    #[test]
    fn bytes_survive_the_wire() {
        let msg = Message::nodes(SiteId(4), vec![node(5), node(6)]).with_target(SiteId(9));
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes.len(), msg.encoded_len());
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn garbage_bytes_are_a_codec_error() {
        assert!(matches!(Message::from_bytes(&[0xff, 0xff, 0xff]), Err(Error::Codec(_))));
    }
}
