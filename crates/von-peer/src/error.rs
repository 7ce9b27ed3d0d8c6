//! Error types for von-peer.

use thiserror::Error;
use von_geometry::GeometryError;

use crate::message::MessageKind;

/// Result type for von-peer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the owning application.
///
/// Protocol anomalies (stale updates, unknown senders, failed deliveries) are
/// not errors: the peer logs them and carries on.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation needs the peer to have called `join` first.
    #[error("peer has not joined the overlay")]
    NotJoined,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Message bytes could not be encoded or decoded.
    #[error("message codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// A message payload doesn't have the shape its type requires.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        kind: MessageKind,
        reason: &'static str,
    },

    /// The geometry oracle rejected a mutation.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),
}
