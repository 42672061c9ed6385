//! Time keeping for bounded waits
//!
//! The driver never reads a hardware timer itself. The platform hands it a
//! [`Clock`] and every wait in the engine is expressed as a [`Timeout`]
//! measured against that clock.

/// Monotonic millisecond clock and sleep provider
pub trait Clock: Sync {
    /// Milliseconds since an arbitrary fixed point
    fn now_ms(&self) -> u64;

    /// Put the calling thread to sleep for `ms` milliseconds
    fn delay_ms(&self, ms: u32);

    /// Called between polls of a busy-wait loop
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// Deadline measured against a [`Clock`]
pub struct Timeout<'a> {
    clock: &'a dyn Clock,
    start: u64,
    duration_ms: u64,
}

impl<'a> Timeout<'a> {
    /// Start a deadline `ms` milliseconds from now
    pub fn from_ms(clock: &'a dyn Clock, ms: u64) -> Self {
        Self {
            clock,
            start: clock.now_ms(),
            duration_ms: ms,
        }
    }

    /// Milliseconds elapsed since the deadline was started
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.start)
    }

    /// True once strictly more than the configured duration has elapsed
    pub fn is_expired(&self) -> bool {
        self.elapsed_ms() > self.duration_ms
    }
}
