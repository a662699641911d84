//! Registry Configuration
//!
//! Timeouts and path settings for the registry client. Defaults match the
//! behavior the rest of the crate is tuned for; tests shorten them to keep
//! runtimes low.

use std::time::Duration;

/// Root path segment all service nodes live under.
pub const DEFAULT_NAMESPACE: &str = "rpc";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// First path segment of every node: `/<namespace>/<group>/<name>/...`.
    pub namespace: String,
    /// Store session timeout, forwarded to the store adapter.
    pub session_timeout: Duration,
    /// Store connect timeout, forwarded to the store adapter.
    pub connect_timeout: Duration,
    /// How long the registration worker waits on an empty queue before it
    /// treats the queue as drained and stops.
    pub queue_poll_timeout: Duration,
    /// Backoff before retrying a failed node creation.
    pub retry_backoff: Duration,
    /// Backoff before re-subscribing a watch whose event stream ended.
    pub resubscribe_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            session_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(15),
            queue_poll_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
            resubscribe_backoff: Duration::from_secs(1),
        }
    }
}

impl RegistryConfig {
    /// Config with short timings for tests and local demos.
    pub fn fast() -> Self {
        Self {
            queue_poll_timeout: Duration::from_millis(200),
            retry_backoff: Duration::from_millis(50),
            resubscribe_backoff: Duration::from_millis(50),
            ..Self::default()
        }
    }
}
