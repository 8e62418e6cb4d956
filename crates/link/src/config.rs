//! Configuration for the communicator and its engine.

use std::time::Duration;

/// Default time to wait for a response to a GET or SET.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Order in which the send pump drains the outbound queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainOrder {
    /// Oldest message first.
    #[default]
    Fifo,
    /// Most recently enqueued message first.
    Lifo,
}

/// Configuration for the communicator.
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    /// When false, the engine does not run and sends fail immediately.
    pub enabled: bool,
    /// Outbound queue drain order.
    pub drain_order: DrainOrder,
    /// Pause between closing a failed transport and reopening it.
    pub reconnect_delay: Duration,
    /// Interval at which readers and writers poll an invalid transport.
    pub poll_interval: Duration,
    /// Response timeout used by callers that do not pick one.
    pub default_timeout: Duration,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drain_order: DrainOrder::Fifo,
            reconnect_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            default_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}
