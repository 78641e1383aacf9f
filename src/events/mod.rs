//! Supervisor lifecycle events.
//!
//! Every transition the control loop takes is published as an [`Event`] on the
//! [`Bus`], a thin broadcast-channel wrapper. The supervisor installs a
//! [`LogWriter`] that forwards the stream to `tracing`; tests and callers can
//! subscribe to the same bus to observe transitions in order.

mod bus;
mod event;
mod log;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use log::LogWriter;
