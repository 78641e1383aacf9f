//! Supervisor core: control loop, embedded server, signal stream.
//!
//! Internal modules:
//! - [`control`]: the state machine multiplexing signals and worker channels
//!   into fork / shutdown / continue decisions;
//! - [`server`]: the axum server bound to the supervised listener, with a
//!   bounded graceful stop;
//! - [`signals`]: the buffered Unix signal channel.
//!
//! The only public API from this module is [`Supervisor`].

mod control;
mod server;
mod signals;

pub use control::Supervisor;
