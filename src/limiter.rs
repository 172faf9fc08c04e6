//! Outbound request throttle.
//!
//! A token bucket kept as a "theoretical arrival time" so that waiting
//! callers are served in reservation order. The bucket is shared by every
//! worker of an aggregation call, so raising concurrency never raises the
//! request rate against the upstream providers.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

/// Token-bucket throttle for upstream calls
#[derive(Debug)]
pub struct Throttle {
    /// Time needed to earn one token
    interval: Duration,
    /// Tokens that may be spent back to back
    burst: u32,
    /// Instant at which the bucket is next considered empty
    next_free: Mutex<Instant>,
}

impl Throttle {
    /// Create a throttle that issues one token per `interval`, allowing
    /// `burst` tokens in a row when the bucket is full.
    #[must_use]
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst: burst.max(1),
            next_free: Mutex::new(Instant::now()),
        }
    }

    /// A throttle that never waits
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 1)
    }

    /// Reserve the next token and return when it may be spent.
    fn reserve(&self, now: Instant) -> Instant {
        let mut next_free = self
            .next_free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = (*next_free).max(now);
        let tolerance = self.interval * (self.burst - 1);
        let ready = start
            .checked_sub(tolerance)
            .map_or(now, |earliest| earliest.max(now));
        *next_free = start + self.interval;
        ready
    }

    /// Wait until a request may be issued.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let now = Instant::now();
        let ready = self.reserve(now);
        if ready > now {
            trace!("Throttled for {:?}", ready - now);
            sleep_until(ready).await;
        }
    }

    /// How long a request issued now would wait, without reserving
    #[cfg(test)]
    fn time_until_next_request(&self) -> Duration {
        let now = Instant::now();
        let next_free = *self
            .next_free
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let tolerance = self.interval * (self.burst - 1);
        next_free
            .checked_sub(tolerance)
            .map_or(Duration::ZERO, |earliest| {
                earliest.saturating_duration_since(now)
            })
    }
}
