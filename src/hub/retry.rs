// Reconnect schedule.

use std::time::Duration;

/// Fixed list of delays before successive reconnect attempts.
///
/// Attempt `n` (0-based, counted since the last successful connection)
/// waits `delays[n]`. Once the list is exhausted the client gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A policy that never retries.
    pub fn never() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.delays.get(attempt as usize).copied()
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ])
    }
}
