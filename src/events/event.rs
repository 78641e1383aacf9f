//! # Lifecycle events emitted by the supervisor.
//!
//! [`EventKind`] classifies the transitions of the control loop; [`Event`]
//! carries the metadata (address, pid, signal name, delay, reason).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so subscribers can restore the exact order of transitions.
//!
//! ## Example
//! ```rust
//! use handoff::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ChildForked).with_pid(4242);
//! assert_eq!(ev.kind, EventKind::ChildForked);
//! assert_eq!(ev.pid, Some(4242));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Listener acquisition ===
    /// An inherited listener was rebuilt from the environment descriptor.
    ///
    /// Sets: `address`.
    ListenerImported,

    /// A fresh listening socket was bound (no usable inherited descriptor).
    ///
    /// Sets: `address`.
    ListenerCreated,

    // === Embedded server ===
    /// The embedded server started accepting on the listener.
    ///
    /// Sets: `address`, `pid`.
    ServerStarted,

    /// The embedded server finished its drain.
    ServerStopped,

    /// The drain did not finish within the grace period.
    ///
    /// Sets: `delay_ms` (the grace ceiling).
    GraceExceeded,

    // === Control loop triggers ===
    /// An OS signal was received.
    ///
    /// Sets: `signal`.
    SignalReceived,

    /// The worker emitted a fault, requesting restart-and-handoff.
    ///
    /// Sets: `reason`.
    WorkerFault,

    /// The worker signaled completion, requesting clean shutdown.
    WorkerDone,

    /// Shutdown decided; the server drain starts next.
    ShutdownRequested,

    // === Fork path ===
    /// A restart was decided; the loop sleeps the worker's cool-down before
    /// forking.
    ///
    /// Sets: `delay_ms`.
    RestartScheduled,

    /// A child process was spawned and inherited the listener.
    ///
    /// Sets: `pid` (the child's).
    ChildForked,

    /// Forking a child failed; the current generation keeps serving.
    ///
    /// Sets: `reason`.
    ForkFailed,
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Bind address, if applicable.
    pub address: Option<Arc<str>>,
    /// OS signal name (`SIGHUP`, ...), if applicable.
    pub signal: Option<&'static str>,
    /// Process id (the serving process or a forked child).
    pub pid: Option<u32>,
    /// Delay or grace ceiling in milliseconds (compact).
    pub delay_ms: Option<u64>,
    /// Human-readable reason (fault message, fork error).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and the
    /// next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            address: None,
            signal: None,
            pid: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a bind address.
    #[inline]
    pub fn with_address(mut self, address: impl Into<Arc<str>>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Attaches an OS signal name.
    #[inline]
    pub fn with_signal(mut self, signal: &'static str) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
