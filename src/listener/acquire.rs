//! # Listener acquisition: import an inherited socket or bind a fresh one.
//!
//! ## Import path
//! The parent generation leaves a [`ListenerDescriptor`] under the configured
//! environment variable and the socket itself at fd [`LISTENER_FD`](super::LISTENER_FD).
//! Import decodes the descriptor, guards the address, validates that the
//! inherited fd really is a listening stream socket, and only then takes
//! ownership of it.
//!
//! ## Fallback policy
//! [`create_or_import`] treats **any** import failure as "no inherited
//! listener" and binds fresh. This is deliberate best-effort: a stale, foreign
//! or corrupted descriptor must never prevent startup. Only the bind error of
//! the create path surfaces.

use std::net::TcpListener;
use std::os::fd::{BorrowedFd, FromRawFd};

use nix::errno::Errno;
use nix::sys::socket::{getsockopt, sockopt, SockType};

use super::descriptor::ListenerDescriptor;
use crate::config::Config;
use crate::error::{AcquireError, RuntimeError};

/// Serializes environment access across the test binary. `setenv` and
/// `getenv` must not run concurrently from different threads, and distinct
/// keys do not make them safe.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// How the supervisor came to own its listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Rebuilt from an inherited descriptor.
    Imported,
    /// Bound fresh on the configured address.
    Created,
}

/// A bound, listening socket plus the path that produced it.
#[derive(Debug)]
pub(crate) struct Acquired {
    pub listener: TcpListener,
    pub origin: Origin,
}

/// Rebuilds a listener from the descriptor in the environment.
///
/// The inherited fd is validated before ownership is taken: a closed fd, a
/// non-socket, or a socket that is not a listening stream socket is rejected
/// without touching it.
pub(crate) fn import_listener(cfg: &Config) -> Result<TcpListener, AcquireError> {
    let key = cfg.env_key.as_ref();
    let raw = std::env::var(key).map_err(|_| AcquireError::NoInheritedListener {
        key: key.to_string(),
    })?;
    let descriptor = ListenerDescriptor::decode(&raw)?;

    let expected = cfg.bind_address();
    if descriptor.address != expected {
        return Err(AcquireError::AddressMismatch {
            expected: expected.to_string(),
            found: descriptor.address,
        });
    }

    let fd = descriptor.fd;
    if fd < 0 {
        return Err(AcquireError::Reconstruction {
            fd,
            source: Errno::EBADF,
        });
    }

    // Probe the fd before claiming it: getsockopt fails with EBADF/ENOTSOCK
    // for anything that is not an open socket.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let sock_type = getsockopt(&borrowed, sockopt::SockType)
        .map_err(|source| AcquireError::Reconstruction { fd, source })?;
    if sock_type != SockType::Stream {
        return Err(AcquireError::UnsupportedListener { fd });
    }
    let listening = getsockopt(&borrowed, sockopt::AcceptConn)
        .map_err(|source| AcquireError::Reconstruction { fd, source })?;
    if !listening {
        return Err(AcquireError::UnsupportedListener { fd });
    }

    // Validated: take ownership of the inherited fd.
    Ok(unsafe { TcpListener::from_raw_fd(fd) })
}

/// Binds a fresh listening socket on the configured address.
pub(crate) fn create_listener(cfg: &Config) -> Result<TcpListener, std::io::Error> {
    TcpListener::bind(cfg.bind_address())
}

/// Imports the inherited listener if possible, otherwise binds fresh.
///
/// Import failures are swallowed; only a failed bind surfaces, as
/// [`RuntimeError::Bind`].
pub(crate) fn create_or_import(cfg: &Config) -> Result<Acquired, RuntimeError> {
    if let Ok(listener) = import_listener(cfg) {
        return Ok(Acquired {
            listener,
            origin: Origin::Imported,
        });
    }
    let listener = create_listener(cfg).map_err(|source| RuntimeError::Bind {
        address: cfg.bind_address().to_string(),
        source,
    })?;
    Ok(Acquired {
        listener,
        origin: Origin::Created,
    })
}
