//! Flow timebase
//!
//! Every timestamp the scorers see (frame stamps, dwell starts, cooldowns)
//! is seconds since the flow started, taken from one monotonic source.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock measuring seconds since flow start.
#[derive(Debug, Clone)]
pub struct FlowClock {
    start: Arc<Instant>,
}

impl FlowClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Share an existing timebase with another component.
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Seconds elapsed since the clock was created.
    #[inline]
    pub fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Flow time for a given instant; instants before the start map to 0.
    #[inline]
    pub fn at(&self, instant: Instant) -> f64 {
        instant
            .checked_duration_since(*self.start)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }

    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for FlowClock {
    fn default() -> Self {
        Self::new()
    }
}
