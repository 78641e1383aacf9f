//! # The `Subordinate` trait and its channel plumbing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Opaque reason a workload gives for requesting a restart.
///
/// The supervisor never inspects it beyond logging; cheap to clone so it can
/// travel a broadcast channel.
#[derive(Clone, Debug)]
pub struct Fault(Arc<str>);

impl Fault {
    /// Creates a fault with the given reason.
    pub fn new(reason: impl Into<Arc<str>>) -> Self {
        Self(reason.into())
    }

    /// Returns the reason string.
    pub fn reason(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A supervised workload.
///
/// The supervisor holds an `Arc<dyn Subordinate>` but does not manage the
/// workload's internal resources; it only listens on the two channels and
/// consults the cool-down before forking. `run` (and `initiate`, if used) are
/// each invoked exactly once, on their own tokio tasks.
///
/// Implementors typically embed a [`FaultHandle`] and forward the two
/// `subscribe` calls to it.
#[async_trait]
pub trait Subordinate: Send + Sync + 'static {
    /// Optional pre-run hook, spawned concurrently with [`Subordinate::run`].
    ///
    /// Lets a workload perform deferred initialization (credentials, warm
    /// caches) before consuming external input. Defaults to a no-op.
    async fn initiate(&self) {}

    /// The workload's entry point.
    ///
    /// May run forever or return; the supervisor reacts only to the channels,
    /// never to `run` returning. The supervisor never cancels it.
    async fn run(&self);

    /// Fresh receiver on the fault channel.
    ///
    /// `Some(fault)` is fatal-for-this-generation and triggers
    /// restart-and-handoff; `None` is ignored.
    fn faults(&self) -> broadcast::Receiver<Option<Fault>>;

    /// Fresh receiver on the done channel.
    ///
    /// `true` triggers clean shutdown (no restart); `false` is ignored.
    fn done(&self) -> broadcast::Receiver<bool>;

    /// Cool-down the control loop sleeps immediately before forking a child.
    fn restart_delay(&self) -> Duration;
}

/// Owns the fault and done senders for a workload.
///
/// Grounded on the same broadcast-sender pattern as the event [`Bus`](crate::Bus):
/// the handle keeps the senders, everyone else takes receivers.
#[derive(Clone, Debug)]
pub struct FaultHandle {
    faults: broadcast::Sender<Option<Fault>>,
    done: broadcast::Sender<bool>,
}

impl FaultHandle {
    /// Creates a handle whose channels buffer up to `capacity` values
    /// (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (faults, _) = broadcast::channel(capacity);
        let (done, _) = broadcast::channel(capacity);
        Self { faults, done }
    }

    /// Emits a fault, requesting restart-and-handoff.
    pub fn fault(&self, fault: Fault) {
        let _ = self.faults.send(Some(fault));
    }

    /// Signals completion, requesting clean shutdown.
    pub fn done(&self) {
        let _ = self.done.send(true);
    }

    /// Fresh receiver on the fault channel.
    pub fn subscribe_faults(&self) -> broadcast::Receiver<Option<Fault>> {
        self.faults.subscribe()
    }

    /// Fresh receiver on the done channel.
    pub fn subscribe_done(&self) -> broadcast::Receiver<bool> {
        self.done.subscribe()
    }

    /// Raw fault sender, for workloads that need to emit `None`.
    pub fn fault_tx(&self) -> &broadcast::Sender<Option<Fault>> {
        &self.faults
    }

    /// Raw done sender, for workloads that need to emit `false`.
    pub fn done_tx(&self) -> &broadcast::Sender<bool> {
        &self.done
    }
}
