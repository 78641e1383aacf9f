//! # Supervisor: the signal-driven control loop.
//!
//! The [`Supervisor`] owns the listening socket, the embedded server, and the
//! event [`Bus`]. It holds (but does not manage) the current [`Subordinate`]
//! and multiplexes three sources into one serial decision stream:
//!
//! | trigger                    | decision                                |
//! |----------------------------|-----------------------------------------|
//! | `SIGHUP`                   | fork, hand off, drain, return           |
//! | `SIGUSR2`                  | fork, keep serving (shared socket)      |
//! | `SIGINT` / `SIGQUIT`       | drain, return                           |
//! | `Some(fault)` from worker  | same as `SIGHUP`                        |
//! | `true` on done channel     | same as `SIGINT`                        |
//!
//! ## State machine
//! ```text
//!            ┌──────────────────────────── SIGUSR2: fork only ───┐
//!            ▼                                                   │
//!        RUNNING ── SIGHUP / worker fault ──► RESTARTING ────────┼──► TERMINATED
//!            │         (sleep cool-down, fork, clear worker,     │
//!            │          drain within grace)                      │
//!            └── SIGINT / SIGQUIT / worker done ──► SHUTTING_DOWN┴──► TERMINATED
//! ```
//!
//! ## Rules
//! - Triggers are handled **strictly one at a time**; no two forks can race on
//!   the listener, and the worker reference is touched only from this loop.
//! - A failed fork is published and swallowed; the generation keeps serving
//!   and the next trigger re-attempts. No automatic retry.
//! - The loop's return value is the embedded server's drain result; exceeding
//!   the grace period is [`RuntimeError::GraceExceeded`].

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RuntimeError, SpawnError};
use crate::events::{Bus, Event, EventKind, LogWriter};
use crate::listener::{self, Origin};
use crate::spawn;
use crate::worker::{self, Subordinate};

use super::server::EmbeddedServer;
use super::signals::{Signal, SignalStream};

/// What the control loop decided to do with one trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Decision {
    /// Fork a child, hand the listener off, drain and return.
    Handoff,
    /// Fork a child but keep this generation serving.
    SpawnOnly,
    /// Drain and return without forking.
    Shutdown,
}

/// Seam between the control loop and process creation; yields the child pid.
///
/// Tests swap it out, since the real fork re-executes the current binary.
type ForkFn = Box<dyn Fn(Option<&TcpListener>, &Config) -> Result<u32, SpawnError> + Send + Sync>;

/// Owns one listener and one embedded server; supervises one workload.
///
/// Created with [`Supervisor::bind`], driven with [`Supervisor::run`]. The
/// listener is handed to children only by fd duplication; this process's
/// handle stays valid until it exits.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    listener: Option<TcpListener>,
    origin: Origin,
    worker: Option<Arc<dyn Subordinate>>,
    forker: ForkFn,
}

impl Supervisor {
    /// Acquires the listener (inherited or fresh) and builds the supervisor.
    ///
    /// Startup failures (a failed bind) surface here; the caller should exit
    /// non-zero on them.
    pub fn bind(cfg: Config) -> Result<Self, RuntimeError> {
        let bus = Bus::new(cfg.bus_capacity);
        let acquired = listener::create_or_import(&cfg)?;
        Ok(Self {
            cfg,
            bus,
            listener: Some(acquired.listener),
            origin: acquired.origin,
            worker: None,
            forker: Box::new(|listener, cfg| {
                spawn::fork_child(listener, cfg).map(|child| child.id())
            }),
        })
    }

    /// The supervisor's event bus; subscribe to observe transitions.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The address the listener is actually bound on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Runs the control loop until handoff or shutdown.
    ///
    /// Starts the embedded server, spawns the workload's `initiate` and `run`
    /// on their own tasks, registers the signal handlers, then waits on the
    /// first ready trigger. Returns the server's drain result.
    pub async fn run(self, sub: Arc<dyn Subordinate>) -> Result<(), RuntimeError> {
        let signals = SignalStream::listen(self.cfg.signal_capacity_clamped())?;
        self.run_with(sub, signals).await
    }

    async fn run_with(
        mut self,
        sub: Arc<dyn Subordinate>,
        mut signals: SignalStream,
    ) -> Result<(), RuntimeError> {
        let _ = LogWriter::spawn(self.bus.subscribe());

        let mut faults = sub.faults();
        let mut done = sub.done();

        let address: Arc<str> = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.cfg.bind_address().to_string())
            .into();
        let acquired = match self.origin {
            Origin::Imported => EventKind::ListenerImported,
            Origin::Created => EventKind::ListenerCreated,
        };
        self.bus
            .publish(Event::new(acquired).with_address(address.clone()));

        let server = match self.listener.as_ref() {
            Some(listener) => EmbeddedServer::start(listener)?,
            None => {
                return Err(RuntimeError::Serve(std::io::Error::other(
                    "listener already released",
                )))
            }
        };
        self.bus.publish(
            Event::new(EventKind::ServerStarted)
                .with_address(address)
                .with_pid(std::process::id()),
        );

        {
            let s = Arc::clone(&sub);
            tokio::spawn(async move { s.initiate().await });
        }
        {
            let s = Arc::clone(&sub);
            tokio::spawn(async move { s.run().await });
        }
        self.worker = Some(sub);

        loop {
            let decision = tokio::select! {
                maybe = signals.recv() => match maybe {
                    Some(sig) => {
                        self.bus.publish(
                            Event::new(EventKind::SignalReceived).with_signal(sig.name()),
                        );
                        match sig {
                            Signal::Hangup => Decision::Handoff,
                            Signal::User2 => Decision::SpawnOnly,
                            Signal::Interrupt | Signal::Quit => Decision::Shutdown,
                        }
                    }
                    // Signal forwarder is gone; nothing can trigger a restart
                    // anymore, so drain and leave.
                    None => Decision::Shutdown,
                },
                fault = worker::next_fault(&mut faults) => {
                    self.bus.publish(
                        Event::new(EventKind::WorkerFault)
                            .with_reason(fault.reason().to_string()),
                    );
                    Decision::Handoff
                }
                () = worker::next_done(&mut done) => {
                    self.bus.publish(Event::new(EventKind::WorkerDone));
                    Decision::Shutdown
                }
            };

            match decision {
                Decision::Shutdown => {
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                    return self.stop(server).await;
                }
                Decision::SpawnOnly => {
                    // Both generations race on accept; fork failure only logs.
                    let _ = self.fork_after_delay().await;
                }
                Decision::Handoff => {
                    if self.fork_after_delay().await.is_ok() {
                        self.worker = None;
                        self.bus.publish(Event::new(EventKind::ShutdownRequested));
                        return self.stop(server).await;
                    }
                }
            }
        }
    }

    /// Sleeps the workload's cool-down, then forks a child inheriting the
    /// listener. Publishes the outcome either way.
    async fn fork_after_delay(&self) -> Result<u32, SpawnError> {
        let delay = self
            .worker
            .as_ref()
            .map(|w| w.restart_delay())
            .unwrap_or_default();
        self.bus
            .publish(Event::new(EventKind::RestartScheduled).with_delay(delay));
        tokio::time::sleep(delay).await;

        match (self.forker)(self.listener.as_ref(), &self.cfg) {
            Ok(pid) => {
                self.bus
                    .publish(Event::new(EventKind::ChildForked).with_pid(pid));
                Ok(pid)
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::ForkFailed).with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Drains the embedded server within the grace period and publishes the
    /// terminal event.
    async fn stop(&self, server: EmbeddedServer) -> Result<(), RuntimeError> {
        match server.stop(self.cfg.grace).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::ServerStopped));
                Ok(())
            }
            Err(e) => {
                let ev = match &e {
                    RuntimeError::GraceExceeded { grace } => {
                        Event::new(EventKind::GraceExceeded).with_delay(*grace)
                    }
                    other => Event::new(EventKind::ServerStopped).with_reason(other.to_string()),
                };
                self.bus.publish(ev);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::{broadcast, mpsc};

    use crate::worker::{Fault, FaultHandle};

    /// Workload that never signals on its own; tests drive its channels
    /// through a cloned [`FaultHandle`].
    struct StubWorker {
        handle: FaultHandle,
    }

    #[async_trait]
    impl Subordinate for StubWorker {
        async fn run(&self) {
            std::future::pending::<()>().await;
        }
        fn faults(&self) -> broadcast::Receiver<Option<Fault>> {
            self.handle.subscribe_faults()
        }
        fn done(&self) -> broadcast::Receiver<bool> {
            self.handle.subscribe_done()
        }
        fn restart_delay(&self) -> Duration {
            Duration::ZERO
        }
    }

    struct Harness {
        run: tokio::task::JoinHandle<Result<(), RuntimeError>>,
        events: broadcast::Receiver<Event>,
        signals: mpsc::Sender<Signal>,
        handle: FaultHandle,
        addr: SocketAddr,
    }

    /// Binds on an ephemeral port, starts the loop with injected signals, and
    /// waits for the server to come up before returning.
    async fn start_supervisor() -> Harness {
        start_with(None).await
    }

    /// Like [`start_supervisor`], but with a stub in place of the real fork.
    async fn start_with(forker: Option<ForkFn>) -> Harness {
        let cfg = Config {
            address: "127.0.0.1:0".into(),
            grace: Duration::from_secs(5),
            ..Config::default()
        };
        let mut sup = {
            let _env = crate::listener::env_lock();
            Supervisor::bind(cfg).unwrap()
        };
        if let Some(forker) = forker {
            sup.forker = forker;
        }
        let addr = sup.local_addr().unwrap();
        let mut events = sup.bus().subscribe();

        let handle = FaultHandle::new(8);
        let worker = Arc::new(StubWorker {
            handle: handle.clone(),
        });
        let (tx, rx) = mpsc::channel(16);
        let run = tokio::spawn(sup.run_with(worker, SignalStream::from_receiver(rx)));

        // Once ServerStarted is observed the loop is subscribed to the worker
        // channels and it is safe to send on them.
        wait_for(&mut events, EventKind::ServerStarted).await;

        Harness {
            run,
            events,
            signals: tx,
            handle,
            addr,
        }
    }

    async fn wait_for(events: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    fn fork_ok(pid: u32) -> ForkFn {
        Box::new(move |_, _| Ok(pid))
    }

    fn fork_fails() -> ForkFn {
        Box::new(|_, _| Err(SpawnError::Spawn(std::io::Error::other("spawn refused"))))
    }

    fn fork_counted(counter: Arc<AtomicUsize>) -> ForkFn {
        Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
    }

    async fn drain_kinds(mut rx: broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.recv().await {
            kinds.push(ev.kind);
        }
        kinds
    }

    async fn get_hello(addr: SocketAddr) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn interrupt_shuts_down_without_forking() {
        let h = start_supervisor().await;
        h.signals.send(Signal::Interrupt).await.unwrap();

        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::ServerStopped));
        assert!(!kinds.contains(&EventKind::RestartScheduled));
        assert!(!kinds.contains(&EventKind::ChildForked));
    }

    #[tokio::test]
    async fn quit_shuts_down_without_forking() {
        let h = start_supervisor().await;
        h.signals.send(Signal::Quit).await.unwrap();

        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(!kinds.contains(&EventKind::RestartScheduled));
    }

    #[tokio::test]
    async fn done_true_requests_clean_shutdown() {
        let h = start_supervisor().await;
        h.handle.done();

        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(kinds.contains(&EventKind::WorkerDone));
        assert!(kinds.contains(&EventKind::ServerStopped));
        assert!(!kinds.contains(&EventKind::ChildForked));
    }

    #[tokio::test]
    async fn nil_fault_and_false_done_are_no_ops() {
        let h = start_supervisor().await;
        let _ = h.handle.fault_tx().send(None);
        let _ = h.handle.done_tx().send(false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.run.is_finished(), "no-op values must not end the loop");

        h.signals.send(Signal::Interrupt).await.unwrap();
        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(!kinds.contains(&EventKind::WorkerFault));
        assert!(!kinds.contains(&EventKind::WorkerDone));
    }

    #[tokio::test]
    async fn serves_hello_until_shutdown() {
        let h = start_supervisor().await;

        let response = get_hello(h.addr).await;
        assert!(response.contains(&format!("Hello from {}!", std::process::id())));

        h.signals.send(Signal::Interrupt).await.unwrap();
        h.run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn hangup_forks_then_hands_off() {
        let mut h = start_with(Some(fork_ok(4242))).await;
        h.signals.send(Signal::Hangup).await.unwrap();

        wait_for(&mut h.events, EventKind::RestartScheduled).await;
        let forked = wait_for(&mut h.events, EventKind::ChildForked).await;
        assert_eq!(forked.pid, Some(4242));

        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::ServerStopped));
    }

    #[tokio::test]
    async fn worker_fault_triggers_handoff() {
        let mut h = start_with(Some(fork_ok(7))).await;
        h.handle.fault(Fault::new("backend unreachable"));

        let fault = wait_for(&mut h.events, EventKind::WorkerFault).await;
        assert_eq!(fault.reason.as_deref(), Some("backend unreachable"));
        wait_for(&mut h.events, EventKind::ChildForked).await;

        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(kinds.contains(&EventKind::ServerStopped));
    }

    #[tokio::test]
    async fn hangup_keeps_serving_when_fork_fails() {
        let mut h = start_with(Some(fork_fails())).await;
        h.signals.send(Signal::Hangup).await.unwrap();
        wait_for(&mut h.events, EventKind::ForkFailed).await;

        assert!(
            !h.run.is_finished(),
            "failed handoff must keep this generation serving"
        );
        let response = get_hello(h.addr).await;
        assert!(response.contains("Hello from"));

        h.signals.send(Signal::Interrupt).await.unwrap();
        h.run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn user2_forks_and_keeps_serving() {
        let forks = Arc::new(AtomicUsize::new(0));
        let mut h = start_with(Some(fork_counted(Arc::clone(&forks)))).await;
        h.signals.send(Signal::User2).await.unwrap();
        wait_for(&mut h.events, EventKind::ChildForked).await;

        assert!(
            !h.run.is_finished(),
            "restart without handoff must keep this generation serving"
        );
        let response = get_hello(h.addr).await;
        assert!(response.contains(&format!("Hello from {}!", std::process::id())));

        h.signals.send(Signal::Interrupt).await.unwrap();
        h.run.await.unwrap().unwrap();
        assert_eq!(forks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn user2_keeps_serving_when_fork_fails() {
        let mut h = start_with(Some(fork_fails())).await;
        h.signals.send(Signal::User2).await.unwrap();
        wait_for(&mut h.events, EventKind::ForkFailed).await;

        assert!(!h.run.is_finished());
        let response = get_hello(h.addr).await;
        assert!(response.contains("Hello from"));

        h.signals.send(Signal::Interrupt).await.unwrap();
        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        assert!(!kinds.contains(&EventKind::ChildForked));
    }

    #[tokio::test]
    async fn each_spawn_trigger_forks_exactly_once() {
        let forks = Arc::new(AtomicUsize::new(0));
        let mut h = start_with(Some(fork_counted(Arc::clone(&forks)))).await;
        h.signals.send(Signal::User2).await.unwrap();
        h.signals.send(Signal::User2).await.unwrap();
        wait_for(&mut h.events, EventKind::ChildForked).await;
        wait_for(&mut h.events, EventKind::ChildForked).await;

        h.signals.send(Signal::Interrupt).await.unwrap();
        h.run.await.unwrap().unwrap();
        assert_eq!(forks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn triggers_are_processed_serially() {
        let h = start_supervisor().await;
        // Queue several no-op values and a shutdown; the loop must consume
        // them one at a time and terminate exactly once.
        for _ in 0..5 {
            let _ = h.handle.done_tx().send(false);
        }
        h.signals.send(Signal::Interrupt).await.unwrap();

        h.run.await.unwrap().unwrap();
        let kinds = drain_kinds(h.events).await;
        let stops = kinds
            .iter()
            .filter(|k| **k == EventKind::ShutdownRequested)
            .count();
        assert_eq!(stops, 1);
    }
}
