use std::time::{Duration, Instant};

use log::trace;

use crate::Tick;

/// Converts wall-clock progress into fixed-interval ticks. Every elapsed tick
/// is reported, even after a long stall, so that no tick's work is skipped.
pub struct TickScheduler {
    tick_interval: Duration,
    current_tick: Tick,
    next_tick_at: Option<Instant>,
}

impl TickScheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            current_tick: 0,
            next_tick_at: None,
        }
    }

    /// Returns every tick which elapsed up to `now`, oldest first, paired with
    /// the instant that tick was due. The first call fires a tick at `now`.
    pub fn collect_elapsed(&mut self, now: Instant) -> Vec<(Tick, Instant)> {
        let mut next_tick_at = self.next_tick_at.unwrap_or(now);
        let mut output = Vec::new();

        while next_tick_at <= now {
            self.current_tick = self.current_tick.wrapping_add(1);
            output.push((self.current_tick, next_tick_at));
            next_tick_at += self.tick_interval;
        }

        if output.len() > 1 {
            trace!("processing {} elapsed ticks in one advance", output.len());
        }

        self.next_tick_at = Some(next_tick_at);
        output
    }

    /// The most recently fired tick, zero before the first one
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Adopts a remote tick count, so that tick stamps from both sides of a
    /// connection compare meaningfully. The schedule itself is unchanged.
    pub fn sync_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }
}

/// Caps the number of send operations performed during one `advance`
pub struct SendBudget {
    remaining: usize,
}

impl SendBudget {
    pub fn new(max_events: usize) -> Self {
        Self {
            remaining: max_events,
        }
    }

    /// Consumes one unit of budget, returning false once none is left
    pub fn try_take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}
