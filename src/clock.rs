//! Clock abstraction so retry schedules can run against virtual time.

use std::time::{Duration, Instant};

use chrono::Utc;

/// Source of time and blocking delays.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Wall-clock stamp used to build unique remote names.
    fn timestamp(&self) -> String {
        Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
    }
}

/// Real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
