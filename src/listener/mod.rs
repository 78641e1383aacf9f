//! Listener acquisition and the cross-generation descriptor.
//!
//! A supervisor gets its listening socket one of two ways:
//! - **import**: a parent generation left a [`ListenerDescriptor`] in the
//!   environment and the socket at fd [`LISTENER_FD`]; the descriptor is decoded
//!   and the listener rebuilt from the inherited fd;
//! - **create**: no usable descriptor, a fresh socket is bound.
//!
//! `create_or_import` composes the two with a best-effort fallback: any import
//! failure silently falls through to a fresh bind, so a stale or malformed
//! descriptor can never keep the process from starting.

mod acquire;
mod descriptor;

pub use descriptor::ListenerDescriptor;

pub(crate) use acquire::{create_or_import, Origin};

#[cfg(test)]
pub(crate) use acquire::env_lock;

use std::os::fd::RawFd;

/// Fixed fd slot the listener occupies in a child's fd table.
///
/// The child's table is exactly: 0 stdin, 1 stdout, 2 stderr, 3 listener.
/// The descriptor's `fd` field is pinned to this value and assumes that layout.
pub const LISTENER_FD: RawFd = 3;
