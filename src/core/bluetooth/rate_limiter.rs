//! Minimum spacing between accepted writes.

use std::time::Duration;

use tokio::time::Instant;

/// Enforces a minimum interval between two accepted writes.
///
/// The limiter holds no clock state of its own; the writer keeps the
/// timestamp of its last accepted write and asks the limiter whether a new
/// one may go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// True if a write at `now` keeps at least `min_interval` after `last`
    pub fn permits(&self, last: Option<Instant>, now: Instant) -> bool {
        match last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }
}
