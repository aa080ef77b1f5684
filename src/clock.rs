//! Time sources for the room engine.
//!
//! The engine never sleeps. Every deadline is a millisecond value compared against
//! [`Clock::millis`] on each loop pass, and every protocol timestamp is a 32-bit
//! count of seconds from [`Clock::current_time`].
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use chrono::{TimeZone, Utc};

/// Monotonic millisecond counter plus an adjustable real-time clock.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin. Never goes backwards.
    fn millis(&self) -> u64;

    /// Seconds since the Unix epoch, by the room's clock.
    fn current_time(&self) -> u32;

    /// Move the real-time clock. The millisecond counter is unaffected.
    fn set_current_time(&mut self, secs: u32);
}

/// Host clock: `Instant` for deadlines, system time plus an admin-set offset for timestamps.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    offset_secs: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_secs: 0,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn current_time(&self) -> u32 {
        let secs = Utc::now().timestamp() + self.offset_secs;
        secs.clamp(0, u32::MAX as i64) as u32
    }

    fn set_current_time(&mut self, secs: u32) {
        self.offset_secs = secs as i64 - Utc::now().timestamp();
    }
}

/// Hand-driven clock for simulations and tests. Clones share the same time.
///
/// Real time is `epoch + millis / 1000`, so advancing the millisecond counter
/// also moves the seconds clock.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Rc<Cell<u64>>,
    epoch: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(epoch: u32) -> Self {
        Self {
            millis: Rc::new(Cell::new(0)),
            epoch: Rc::new(Cell::new(epoch)),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.set(self.millis.get() + millis);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.millis.get()
    }

    fn current_time(&self) -> u32 {
        self.epoch
            .get()
            .saturating_add((self.millis.get() / 1000) as u32)
    }

    fn set_current_time(&mut self, secs: u32) {
        let elapsed = (self.millis.get() / 1000) as u32;
        self.epoch.set(secs.saturating_sub(elapsed));
    }
}

/// Hands out strictly increasing timestamps even when several are needed
/// within the same second.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniqueClock {
    last_unique: u32,
}

impl UniqueClock {
    pub fn next(&mut self, now: u32) -> u32 {
        if now <= self.last_unique {
            self.last_unique += 1;
        } else {
            self.last_unique = now;
        }
        self.last_unique
    }
}

/// Deadline helper: true once `now` has reached `deadline`.
pub fn has_passed(now: u64, deadline: u64) -> bool {
    now >= deadline
}

/// Human readable UTC form of a protocol timestamp, e.g. `14:03:09 - 9/3/2025 UTC`.
pub fn format_timestamp(secs: u32) -> String {
    match Utc.timestamp_opt(secs as i64, 0).single() {
        Some(dt) => dt.format("%H:%M:%S - %-d/%-m/%Y UTC").to_string(),
        None => format!("{secs} (invalid)"),
    }
}
