//! A manually advanced clock.

use std::time::Duration;

use parking_lot::Mutex;

use silbus_core::time::TimeProvider;

/// Time provider whose clock only moves when a test says so.
#[derive(Default)]
pub struct ManualTimeProvider {
    now: Mutex<Duration>,
}

impl ManualTimeProvider {
    /// Create a clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock.
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}
