//! # Listener descriptor codec.
//!
//! [`ListenerDescriptor`] is the single piece of state that crosses process
//! generations: a JSON object carrying the bind address, the fd slot the
//! listener occupies in the child, and the file's name. It is produced once at
//! fork time and consumed once at child startup.
//!
//! Field names are fixed (`address`, `fd`, `filename`); field order is
//! irrelevant on the wire.

use std::os::fd::RawFd;

use serde::{Deserialize, Serialize};

use crate::error::AcquireError;

/// Metadata for a listening socket handed from parent to child.
///
/// Invariant: `address` must exactly match the importing supervisor's
/// configured bind address, otherwise the import is rejected. This keeps a
/// stale descriptor from silently binding the wrong port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDescriptor {
    /// Bind address the socket was created for.
    pub address: String,
    /// Fd slot in the child's fd table (pinned to [`LISTENER_FD`](crate::LISTENER_FD)).
    pub fd: RawFd,
    /// Name of the underlying file (informational; kept for the wire format).
    pub filename: String,
}

impl ListenerDescriptor {
    /// Serializes the descriptor to its environment representation.
    pub fn encode(&self) -> Result<String, AcquireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a descriptor from its environment representation.
    ///
    /// Fails with [`AcquireError::MalformedDescriptor`] if the text is not
    /// valid JSON or is missing a required field.
    pub fn decode(text: &str) -> Result<Self, AcquireError> {
        Ok(serde_json::from_str(text)?)
    }
}
