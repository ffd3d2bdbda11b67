//! Pacing for outbound fan-out.
//!
//! The Bot API throttles bots that send more than roughly thirty messages
//! per second, so broadcast and ad deliveries go through a limiter that
//! enforces a minimum gap between consecutive sends.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Earliest instant the next operation may start.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Waits until an operation is allowed, then reserves the next slot.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_allowed.lock().await;

        let wait_duration = next
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default();

        if !wait_duration.is_zero() {
            debug!("Rate limiter: waiting {:?} before next send", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait_duration
    }

    /// Pushes the next slot back after the platform asked us to slow down.
    pub async fn back_off(&self, wait: Duration) {
        warn!("Send rate limited by the platform, backing off {:?}", wait);
        let mut next = self.next_allowed.lock().await;
        let until = Instant::now() + wait;
        if next.is_none_or(|at| at < until) {
            *next = Some(until);
        }
    }
}
