//! Error types used across the supervisor.
//!
//! Three enums, matching the three failure domains:
//!
//! - [`AcquireError`]: failures while importing an inherited listener. These are
//!   always recovered locally: `create_or_import` falls back to a fresh bind and
//!   never surfaces them to the caller.
//! - [`SpawnError`]: failures while forking a child. Logged and swallowed; the
//!   current generation keeps serving and the next trigger re-attempts.
//! - [`RuntimeError`]: failures that surface to the caller: startup (bind,
//!   signal registration, server start) and shutdown (grace exceeded, server
//!   error on drain).

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

/// Failures while importing an inherited listener from the environment.
///
/// All variants are recoverable: a malformed or mismatched inherited descriptor
/// must never prevent the process from starting, it only means a fresh socket
/// is bound instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The descriptor environment variable is not set.
    #[error("no inherited listener: {key} is not set")]
    NoInheritedListener {
        /// The environment variable that was consulted.
        key: String,
    },

    /// The environment value is not a parseable descriptor.
    #[error("malformed listener descriptor: {0}")]
    MalformedDescriptor(#[from] serde_json::Error),

    /// The inherited descriptor was produced for a different bind address.
    #[error("inherited listener is for {found}, expected {expected}")]
    AddressMismatch {
        /// The supervisor's configured bind address.
        expected: String,
        /// The address recorded in the descriptor.
        found: String,
    },

    /// The inherited fd is a socket, but not a listening stream socket.
    #[error("inherited fd {fd} is not a listening stream socket")]
    UnsupportedListener {
        /// The rejected file descriptor.
        fd: RawFd,
    },

    /// The OS rejected the inherited fd (closed, not a socket).
    #[error("unable to rebuild listener from fd {fd}: {source}")]
    Reconstruction {
        /// The rejected file descriptor.
        fd: RawFd,
        /// The underlying OS error.
        #[source]
        source: Errno,
    },
}

/// Failures while forking a child process for a restart.
///
/// Fork failures are non-fatal to the current generation: the control loop logs
/// them and continues serving. There is no automatic retry; the next trigger
/// (signal or worker fault) re-attempts.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The supervisor owns no listener to hand off.
    #[error("no listener to hand off")]
    NilListener,

    /// Duplicating the listener fd or reading its local address failed.
    #[error("unable to stage listener for handoff: {0}")]
    Stage(#[source] io::Error),

    /// The OS could not report the currently running executable.
    #[error("unable to resolve current executable: {0}")]
    ExecutableResolution(#[source] io::Error),

    /// Process creation failed.
    #[error("unable to spawn child process: {0}")]
    Spawn(#[source] io::Error),
}

/// Failures surfaced to the caller of [`Supervisor`](crate::Supervisor).
///
/// Construction-time errors (`Bind`, `Signals`, `Serve`) should make the caller
/// exit non-zero. `GraceExceeded` and `Shutdown` are the control loop's terminal
/// result when the drain goes wrong.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Binding a fresh listening socket failed (port in use, permission denied,
    /// unparseable address).
    #[error("unable to bind {address}: {source}")]
    Bind {
        /// The configured bind address.
        address: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Registering the Unix signal handlers failed.
    #[error("unable to register signal handlers: {0}")]
    Signals(#[source] io::Error),

    /// Starting the embedded server failed.
    #[error("unable to start embedded server: {0}")]
    Serve(#[source] io::Error),

    /// The embedded server did not drain within the configured grace period.
    #[error("graceful shutdown exceeded {grace:?}")]
    GraceExceeded {
        /// The configured grace period.
        grace: Duration,
    },

    /// The embedded server reported an error while shutting down.
    #[error("embedded server shutdown failed: {0}")]
    Shutdown(#[source] io::Error),
}
