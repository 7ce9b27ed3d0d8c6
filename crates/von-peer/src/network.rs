//! The transport seam.
//!
//! The peer never touches sockets. Everything it sends or receives goes
//! through a [`NetworkPort`], which also supplies the clock so that simulated
//! and real deployments run the same protocol code.

use std::net::SocketAddr;

use crate::message::Message;
use crate::node::{NodeId, Timestamp};

/// Outcome of a send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Bytes handed to the transport.
    pub bytes_sent: usize,
    /// Targets the message could not be delivered to.
    pub failed: Vec<NodeId>,
}

impl SendReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Transport and clock used by a peer.
pub trait NetworkPort {
    /// Send `msg` to each of its targets.
    fn send_message(&mut self, msg: &Message, reliable: bool) -> SendReport;

    /// Next queued inbound message, if any.
    fn receive_message(&mut self) -> Option<Message>;

    /// Record an id to address binding learned from the protocol.
    ///
    /// Must be called before `id` can be addressed. Returns false if the
    /// transport refused the mapping.
    fn notify_address_mapping(&mut self, id: NodeId, addr: SocketAddr) -> bool;

    /// Address other peers can reach us at.
    fn host_address(&self) -> SocketAddr;

    /// Current time.
    fn timestamp(&self) -> Timestamp;

    /// How many timestamp units make up one second.
    fn timestamps_per_second(&self) -> u64;
}
