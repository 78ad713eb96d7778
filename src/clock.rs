//! Monotonic millisecond clock

use std::time::Instant;

/// Source of monotonic time in milliseconds since agent start
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-independent clock backed by `Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
