//! # Subordinate contract: the capability interface a supervised workload implements.
//!
//! The supervisor knows nothing about a workload's internals. It needs a run
//! entry point, a fault channel, a done channel, a pre-restart cool-down, and
//! an optional async init hook, nothing more. [`Subordinate`]
//! is that contract; [`FaultHandle`] provides the channel plumbing so
//! implementors only forward subscriptions.
//!
//! ## Channel semantics
//! - **faults**: `Some(fault)` requests restart-and-handoff; `None` is ignored.
//! - **done**: `true` requests clean shutdown (no restart); `false` is ignored.
//!
//! Both are broadcast channels so the supervisor can take a fresh receiver at
//! attach time without the workload giving up its sender. The supervisor is
//! the only consumer that acts on them; it observes each value exactly once
//! and strictly serially.

mod subordinate;

pub use subordinate::{Fault, FaultHandle, Subordinate};

use tokio::sync::broadcast::{self, error::RecvError};

/// Resolves to the next actionable fault, skipping `None` values and lag.
///
/// Pends forever once the channel closes, so a finished workload never wakes
/// the control loop again.
pub(crate) async fn next_fault(rx: &mut broadcast::Receiver<Option<Fault>>) -> Fault {
    loop {
        match rx.recv().await {
            Ok(Some(fault)) => return fault,
            Ok(None) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return std::future::pending().await,
        }
    }
}

/// Resolves when the workload signals completion (`true`), skipping `false`
/// values and lag. Pends forever once the channel closes.
pub(crate) async fn next_done(rx: &mut broadcast::Receiver<bool>) {
    loop {
        match rx.recv().await {
            Ok(true) => return,
            Ok(false) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn nil_faults_are_skipped() {
        let handle = FaultHandle::new(8);
        let mut rx = handle.subscribe_faults();

        let _ = handle.fault_tx().send(None);
        handle.fault(Fault::new("boom"));

        let fault = next_fault(&mut rx).await;
        assert_eq!(fault.reason(), "boom");
    }

    #[tokio::test]
    async fn false_done_is_skipped() {
        let handle = FaultHandle::new(8);
        let mut rx = handle.subscribe_done();

        let _ = handle.done_tx().send(false);
        let _ = handle.done_tx().send(true);

        next_done(&mut rx).await;
    }

    #[tokio::test]
    async fn closed_channel_pends_instead_of_spinning() {
        let handle = FaultHandle::new(8);
        let mut rx = handle.subscribe_faults();
        drop(handle);

        let waited =
            tokio::time::timeout(Duration::from_millis(50), next_fault(&mut rx)).await;
        assert!(waited.is_err(), "closed channel must pend, not resolve");
    }
}
