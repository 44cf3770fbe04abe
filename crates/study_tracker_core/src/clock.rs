//! crates/study_tracker_core/src/clock.rs
//!
//! `Clock` implementations: the wall clock used in production and a settable
//! clock for tests.

use crate::ports::Clock;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Mutex;

/// Reads the system time. "Today" is the calendar date in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Falls back to UTC when the offset is outside +/- 24h.
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(0)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// A clock that only moves when told to. "Today" is the UTC date of `now`.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
