//! Configuration for synchronization cycles.

use std::time::Duration;

/// Default egress location: the agent's shared local queue.
pub const DEFAULT_QUEUE: &str = "queue/sockets/queue";

/// Routing tag prefixed to every framed sync message.
pub const SYNC_QUEUE_TAG: u8 = b's';

/// Default bound on retransmission rounds per cycle.
pub const DEFAULT_MAX_RETRANSMIT_ROUNDS: u32 = 64;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout for each wait on a remote response.
    pub response_timeout: Duration,
    /// Maximum retransmission rounds before the cycle fails.
    ///
    /// `None` keeps retrying for as long as the remote reports gaps.
    pub max_retransmit_rounds: Option<u32>,
    /// Location of the single egress queue.
    pub queue_location: String,
    /// Routing tag used by framing transports.
    pub queue_tag: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
            max_retransmit_rounds: Some(DEFAULT_MAX_RETRANSMIT_ROUNDS),
            queue_location: DEFAULT_QUEUE.to_string(),
            queue_tag: SYNC_QUEUE_TAG,
        }
    }
}

impl SyncConfig {
    /// Set the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the retransmission bound (`None` = unbounded).
    pub fn with_max_retransmit_rounds(mut self, rounds: Option<u32>) -> Self {
        self.max_retransmit_rounds = rounds;
        self
    }

    /// Set the egress queue location.
    pub fn with_queue_location(mut self, location: impl Into<String>) -> Self {
        self.queue_location = location.into();
        self
    }

    /// Set the routing tag.
    pub fn with_queue_tag(mut self, tag: u8) -> Self {
        self.queue_tag = tag;
        self
    }
}
