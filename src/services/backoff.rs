use std::thread;
use std::time::Duration;

/// Interruptible linear-backoff sleeper for polling loops.
///
/// Each unsuccessful poll widens the wait up to `max`; a `reset` on success
/// restores the tight interval. The sleep itself ticks one unit at a time
/// and checks the caller's break predicate after every tick, so cancellation
/// latency is bounded by one unit no matter how wide the interval grew.
#[derive(Debug)]
pub struct BackoffTimer {
    current: u32,
    default: u32,
    max: u32,
    increment: u32,
    unit: Duration,
}

impl BackoffTimer {
    pub fn new(default: u32, increment: u32, max: u32) -> Self {
        Self::with_unit(default, increment, max, Duration::from_secs(1))
    }

    /// Same timer with a custom unit duration. Tests run with millisecond
    /// units; production loops use the one second default.
    pub fn with_unit(default: u32, increment: u32, max: u32, unit: Duration) -> Self {
        Self {
            current: default,
            default,
            max: max.max(default),
            increment,
            unit,
        }
    }

    /// Units the next `sleep` will wait.
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.default;
    }

    pub fn increase(&mut self) {
        self.current = (self.current + self.increment).min(self.max);
    }

    /// Block for up to `current` units, returning early as soon as
    /// `should_break` turns true. Always widens the interval on exit so
    /// repeated unsuccessful polls back off monotonically.
    pub fn sleep(&mut self, should_break: impl Fn() -> bool) {
        for _ in 0..self.current {
            thread::sleep(self.unit);
            if should_break() {
                break;
            }
        }
        self.increase();
    }
}
