//! Source of "now" for time-gated rules.
//!
//! Order windows compare against the current UTC time; handlers receive the
//! clock through the application state so tests can pin it.

use chrono::{NaiveDate, NaiveDateTime, Utc};

/// Provides the current UTC date and time
pub trait Clock: Send + Sync {
    /// Current UTC timestamp
    fn now(&self) -> NaiveDateTime;

    /// Current UTC date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
