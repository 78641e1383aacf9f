//! # Global supervisor configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Supervisor`](crate::Supervisor).
//!
//! ## Sentinel values
//! - `address = ""` → [`DEFAULT_ADDRESS`] is used
//! - `signal_capacity` / `bus_capacity` are clamped to a minimum of 1

use std::borrow::Cow;
use std::time::Duration;

/// Bind address used when [`Config::address`] is empty.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// Global configuration for the supervisor.
///
/// Defines:
/// - **Listener identity**: the bind address, which must also match an inherited
///   descriptor exactly for the import path to succeed
/// - **Shutdown behavior**: grace period for the embedded server's drain
/// - **Channel sizing**: OS signal buffer and event bus capacity
/// - **Handoff protocol**: the environment variable carrying the descriptor
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP address the listener is bound on (`host:port`).
    ///
    /// An inherited descriptor whose `address` differs from this value is
    /// rejected and a fresh socket is bound instead. Empty falls back to
    /// [`DEFAULT_ADDRESS`].
    pub address: String,

    /// Maximum time the embedded server gets to finish in-flight requests
    /// after it stops accepting.
    ///
    /// Exceeding it surfaces as [`RuntimeError::GraceExceeded`](crate::RuntimeError::GraceExceeded)
    /// from the control loop.
    pub grace: Duration,

    /// Capacity of the buffered OS signal channel.
    ///
    /// Signal delivery is asynchronous; the buffer keeps signals from being
    /// dropped while the control loop is busy elsewhere (minimum 1).
    pub signal_capacity: usize,

    /// Capacity of the event bus ring buffer.
    ///
    /// Slow subscribers that lag behind more than this many events observe
    /// `Lagged` and skip older items (minimum 1).
    pub bus_capacity: usize,

    /// Environment variable carrying the encoded listener descriptor across
    /// process generations.
    pub env_key: Cow<'static, str>,
}

impl Config {
    /// Returns the effective bind address, substituting [`DEFAULT_ADDRESS`]
    /// when [`Config::address`] is empty.
    pub fn bind_address(&self) -> &str {
        if self.address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            &self.address
        }
    }

    /// Returns the signal channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn signal_capacity_clamped(&self) -> usize {
        self.signal_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `address = ""` (resolves to [`DEFAULT_ADDRESS`])
    /// - `grace = 5s`
    /// - `signal_capacity = 1024`
    /// - `bus_capacity = 1024`
    /// - `env_key = "LISTENER"`
    fn default() -> Self {
        Self {
            address: String::new(),
            grace: Duration::from_secs(5),
            signal_capacity: 1024,
            bus_capacity: 1024,
            env_key: Cow::Borrowed("LISTENER"),
        }
    }
}
