//! # Tracing-backed event listener.
//!
//! [`LogWriter`] drains a bus subscription and forwards each event to
//! `tracing` at a level matching its severity. The supervisor installs one
//! automatically at the start of its run; installing a `tracing` subscriber
//! (or not) is left to the embedding application.
//!
//! ## Output shape
//! ```text
//! INFO  imported inherited listener address=127.0.0.1:8008
//! INFO  signal received signal=SIGHUP
//! INFO  restart scheduled delay_ms=15000
//! INFO  forked child pid=4242
//! WARN  fork failed reason="unable to spawn child process: ..."
//! ERROR grace period exceeded delay_ms=5000
//! ```

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::event::{Event, EventKind};

/// Forwards bus events to `tracing`.
pub struct LogWriter;

impl LogWriter {
    /// Spawns a task draining the given subscription until the bus closes.
    ///
    /// Lagged receivers skip the missed items and keep going.
    pub fn spawn(mut rx: broadcast::Receiver<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => Self::write(&ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn write(ev: &Event) {
        let address = ev.address.as_deref().unwrap_or("");
        let reason = ev.reason.as_deref().unwrap_or("");
        match ev.kind {
            EventKind::ListenerImported => {
                tracing::info!(seq = ev.seq, address, "imported inherited listener");
            }
            EventKind::ListenerCreated => {
                tracing::info!(seq = ev.seq, address, "created fresh listener");
            }
            EventKind::ServerStarted => {
                tracing::info!(seq = ev.seq, address, pid = ev.pid, "embedded server started");
            }
            EventKind::ServerStopped => {
                tracing::info!(seq = ev.seq, "embedded server stopped");
            }
            EventKind::GraceExceeded => {
                tracing::error!(seq = ev.seq, grace_ms = ev.delay_ms, "grace period exceeded");
            }
            EventKind::SignalReceived => {
                tracing::info!(seq = ev.seq, signal = ev.signal, "signal received");
            }
            EventKind::WorkerFault => {
                tracing::warn!(seq = ev.seq, reason, "worker fault");
            }
            EventKind::WorkerDone => {
                tracing::info!(seq = ev.seq, "worker done");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(seq = ev.seq, "shutting down");
            }
            EventKind::RestartScheduled => {
                tracing::info!(seq = ev.seq, delay_ms = ev.delay_ms, "restart scheduled");
            }
            EventKind::ChildForked => {
                tracing::info!(seq = ev.seq, pid = ev.pid, "forked child");
            }
            EventKind::ForkFailed => {
                tracing::warn!(seq = ev.seq, reason, "fork failed");
            }
        }
    }
}
