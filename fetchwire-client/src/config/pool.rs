//! Connection pool configuration.
//!
//! [`PoolConfig`] can be built in code or deserialized from the embedding
//! program's configuration. Durations are expressed in milliseconds on the
//! wire:
//!
//! ```json
//! {
//!   "max_connections": 64,
//!   "max_connections_per_origin": 4,
//!   "idle_timeout_ms": 30000
//! }
//! ```
//!
//! Missing fields take their default values.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default pool limits.
pub mod defaults {
    use std::time::Duration;

    /// Maximum number of open connections across all origins.
    pub const MAX_CONNECTIONS: usize = 256;

    /// Maximum number of open connections to a single origin.
    pub const MAX_CONNECTIONS_PER_ORIGIN: usize = 6;

    /// Maximum number of idle connections kept per origin.
    pub const MAX_IDLE_PER_ORIGIN: usize = 6;

    /// How long an idle connection may sit in the pool before it is dropped.
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// How long opening a connection (TCP and TLS) may take.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Limits and timeouts of a [`ConnectionPool`](crate::ConnectionPool).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of open connections across all origins. Connections
    /// that are still being established count towards the limit.
    pub max_connections: usize,

    /// Maximum number of open connections to a single origin.
    pub max_connections_per_origin: usize,

    /// Maximum number of idle connections kept per origin. Connections
    /// released beyond this limit are closed.
    pub max_idle_per_origin: usize,

    /// Idle connections older than this are not reused.
    #[serde(rename = "idle_timeout_ms", deserialize_with = "millis")]
    pub idle_timeout: Duration,

    /// Time allowed for connecting and completing the TLS handshake.
    #[serde(rename = "connect_timeout_ms", deserialize_with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::MAX_CONNECTIONS,
            max_connections_per_origin: defaults::MAX_CONNECTIONS_PER_ORIGIN,
            max_idle_per_origin: defaults::MAX_IDLE_PER_ORIGIN,
            idle_timeout: defaults::IDLE_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn max_connections_per_origin(mut self, max: usize) -> Self {
        self.max_connections_per_origin = max;
        self
    }

    pub fn max_idle_per_origin(mut self, max: usize) -> Self {
        self.max_idle_per_origin = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// A zero idle limit is allowed and disables keep-alive reuse.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than zero");
        }
        if self.max_connections_per_origin == 0 {
            return Err("max_connections_per_origin must be greater than zero");
        }
        if self.max_connections_per_origin > self.max_connections {
            return Err("max_connections_per_origin must not exceed max_connections");
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than zero");
        }
        Ok(())
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
