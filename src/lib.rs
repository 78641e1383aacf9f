//! # handoff
//!
//! **handoff** is a zero-downtime supervisor for long-running network servers.
//!
//! It lets a process replace its own executable image (upgrade, reload, fatal
//! worker error) without dropping the listening socket: the bound socket's file
//! descriptor is passed to a freshly spawned child through the environment, the
//! child rebuilds the listener from the inherited descriptor, and the parent
//! drains and exits.
//!
//! ## Architecture
//! ```text
//!  startup:
//!    Config ──► Supervisor::bind()
//!                  └─► create_or_import(address)
//!                        ├─ LISTENER env present + valid ──► import inherited fd
//!                        └─ otherwise ───────────────────► bind fresh socket
//!
//!  runtime (Supervisor::run):
//!    ┌──────────────────────────────────────────────────────────────┐
//!    │ Supervisor (single-consumer control loop)                    │
//!    │   owns: listener, embedded server, event Bus                 │
//!    │   holds: Arc<dyn Subordinate> (cleared before handoff)       │
//!    └──────┬──────────────┬──────────────────┬────────────────────┘
//!           ▼              ▼                  ▼
//!     SignalStream    worker faults       worker done
//!     (SIGHUP/USR2/   (broadcast chan,    (broadcast chan,
//!      INT/QUIT)       Some = restart)     true = shutdown)
//!
//!  handoff (SIGHUP or worker fault):
//!    sleep restart_delay() ──► fork_child()
//!      child fd table: 0 stdin, 1 stdout, 2 stderr, 3 listener
//!      child env:      LISTENER={"address":..,"fd":3,"filename":..}
//!    parent: stop accepting, drain within grace, return
//!
//!  concurrent restart (SIGUSR2):
//!    fork_child() only; both generations accept on the shared socket
//! ```
//!
//! ## Event flow
//! Every transition the control loop takes is published on an internal [`Bus`]
//! (broadcast channel). A [`LogWriter`] forwards events to `tracing`; callers
//! can [`Supervisor::bus`]`().subscribe()` to observe the same stream.
//!
//! ## Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use async_trait::async_trait;
//! use tokio::sync::broadcast;
//! use handoff::{Config, Fault, FaultHandle, Subordinate, Supervisor};
//!
//! struct Worker {
//!     handle: FaultHandle,
//! }
//!
//! #[async_trait]
//! impl Subordinate for Worker {
//!     async fn run(&self) {
//!         // do work; on fatal error:
//!         self.handle.fault(Fault::new("backend unreachable"));
//!     }
//!     fn faults(&self) -> broadcast::Receiver<Option<Fault>> {
//!         self.handle.subscribe_faults()
//!     }
//!     fn done(&self) -> broadcast::Receiver<bool> {
//!         self.handle.subscribe_done()
//!     }
//!     fn restart_delay(&self) -> Duration {
//!         Duration::from_secs(1)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let supervisor = Supervisor::bind(Config::default())?;
//!     let worker = Arc::new(Worker { handle: FaultHandle::new(8) });
//!     supervisor.run(worker).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform
//! Unix only: the handoff protocol relies on fd inheritance across `exec` and
//! on `SIGHUP`/`SIGUSR2`/`SIGINT`/`SIGQUIT`.

mod config;
mod error;
mod events;
mod listener;
mod spawn;
mod supervisor;
mod worker;

pub use config::{Config, DEFAULT_ADDRESS};
pub use error::{AcquireError, RuntimeError, SpawnError};
pub use events::{Bus, Event, EventKind, LogWriter};
pub use listener::{ListenerDescriptor, LISTENER_FD};
pub use supervisor::Supervisor;
pub use worker::{Fault, FaultHandle, Subordinate};
