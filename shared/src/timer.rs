use std::time::{Duration, Instant};

/// A Timer with a given duration after which it will enter into a "Ringing"
/// state. The Timer can be reset at an arbitrary time. Time is always passed
/// in so that callers control the clock.
pub struct Timer {
    duration: Duration,
    last: Option<Instant>,
}

impl Timer {
    /// Creates a new Timer with a given Duration, it rings on first check
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last: None,
        }
    }

    /// Creates a Timer which rings `rate` times per second. A rate of zero
    /// always rings.
    pub fn from_rate(rate: u32) -> Self {
        if rate == 0 {
            return Self::new(Duration::ZERO);
        }
        Self::new(Duration::from_secs(1) / rate)
    }

    /// Reset the Timer to stop ringing and wait till `duration` has elapsed again
    pub fn reset(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Gets whether or not the Timer is "Ringing" (i.e. the given duration has
    /// elapsed since the last "reset")
    pub fn ringing(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
