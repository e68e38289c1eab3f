//! Time sources for cache expiry and update stamps.
//!
//! # Responsibility
//! - Provide monotonic instants for TTL checks.
//! - Provide the calendar date used for `last_updated` and fee year bounds.

use chrono::{Local, NaiveDate};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Clock abstraction used by `RecordStore`.
pub trait Clock {
    /// Monotonic instant used for cache age.
    fn now(&self) -> Instant;
    /// Current local calendar date.
    fn today(&self) -> NaiveDate;
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Hand-driven clock for deterministic tests and replays.
///
/// Clones share state, so a test can keep one handle while the store owns
/// another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Rc<Cell<Duration>>,
    today: Rc<Cell<NaiveDate>>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
            today: Rc::new(Cell::new(today)),
        }
    }

    /// Moves monotonic time forward.
    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    pub fn set_today(&self, today: NaiveDate) {
        self.today.set(today);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn today(&self) -> NaiveDate {
        self.today.get()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock};
    use chrono::NaiveDate;
    use std::time::Duration;

    #[test]
    fn clones_share_elapsed_time_and_date() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        let handle = clock.clone();
        let start = clock.now();

        handle.advance(Duration::from_secs(30));
        handle.set_today(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());

        assert_eq!(clock.now() - start, Duration::from_secs(30));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());
    }
}
