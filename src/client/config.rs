//! Client session configuration

use std::time::Duration;

/// Client session configuration options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hub address (`host:port`)
    pub addr: String,

    /// Base reconnect delay
    pub base_delay: Duration,

    /// Cap on the reconnect delay
    pub max_delay: Duration,

    /// Consecutive failed attempts before the session gives up
    pub max_reconnect_attempts: u32,
}

impl SessionConfig {
    /// Create a config for the given hub address
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
        }
    }

    /// Set the base reconnect delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the reconnect delay cap
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the reconnect attempt cap
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Backoff delay for the given attempt: `min(base * 2^attempt, max)`
    ///
    /// `attempt` is the already-incremented counter, so the first retry
    /// (attempt 1) waits twice the base delay.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}
