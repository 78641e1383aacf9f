//! # Buffered Unix signal stream.
//!
//! The control loop consumes signals one at a time; delivery is asynchronous.
//! [`SignalStream`] registers the four handlers the supervisor cares about and
//! forwards them into a bounded mpsc channel, so signals arriving while the
//! loop is busy (sleeping a cool-down, draining the server) are not lost.
//!
//! ## Signals
//! - `SIGHUP`: restart and hand the listener off
//! - `SIGUSR2`: restart without handoff (both generations keep serving)
//! - `SIGINT` / `SIGQUIT`: graceful shutdown
//!
//! No other signals are intercepted.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::error::RuntimeError;

/// The OS signals the control loop reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Restart-and-handoff.
    Hangup,
    /// Restart without handoff.
    User2,
    /// Graceful shutdown.
    Interrupt,
    /// Graceful shutdown.
    Quit,
}

impl Signal {
    /// Conventional name, for logging.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Signal::Hangup => "SIGHUP",
            Signal::User2 => "SIGUSR2",
            Signal::Interrupt => "SIGINT",
            Signal::Quit => "SIGQUIT",
        }
    }
}

/// Receiving end of the buffered signal channel.
pub(crate) struct SignalStream {
    rx: mpsc::Receiver<Signal>,
}

impl SignalStream {
    /// Registers the handlers and spawns the forwarding task.
    ///
    /// Signals beyond the buffer capacity are dropped rather than blocking
    /// the handler task.
    pub(crate) fn listen(capacity: usize) -> Result<Self, RuntimeError> {
        let mut hangup = signal(SignalKind::hangup()).map_err(RuntimeError::Signals)?;
        let mut user2 = signal(SignalKind::user_defined2()).map_err(RuntimeError::Signals)?;
        let mut interrupt = signal(SignalKind::interrupt()).map_err(RuntimeError::Signals)?;
        let mut quit = signal(SignalKind::quit()).map_err(RuntimeError::Signals)?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            loop {
                let sig = tokio::select! {
                    Some(()) = hangup.recv() => Signal::Hangup,
                    Some(()) = user2.recv() => Signal::User2,
                    Some(()) = interrupt.recv() => Signal::Interrupt,
                    Some(()) = quit.recv() => Signal::Quit,
                    else => break,
                };
                if tx.try_send(sig).is_err() && tx.is_closed() {
                    break;
                }
            }
        });

        Ok(Self { rx })
    }

    /// Builds a stream from an existing receiver (tests drive the loop by
    /// sending signals directly).
    #[cfg(test)]
    pub(crate) fn from_receiver(rx: mpsc::Receiver<Signal>) -> Self {
        Self { rx }
    }

    /// Receives the next buffered signal; `None` once the forwarder is gone.
    pub(crate) async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_conventional() {
        assert_eq!(Signal::Hangup.name(), "SIGHUP");
        assert_eq!(Signal::User2.name(), "SIGUSR2");
        assert_eq!(Signal::Interrupt.name(), "SIGINT");
        assert_eq!(Signal::Quit.name(), "SIGQUIT");
    }

    #[tokio::test]
    async fn injected_receiver_delivers_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = SignalStream::from_receiver(rx);
        tx.send(Signal::User2).await.unwrap();
        tx.send(Signal::Interrupt).await.unwrap();

        assert_eq!(stream.recv().await, Some(Signal::User2));
        assert_eq!(stream.recv().await, Some(Signal::Interrupt));
    }
}
