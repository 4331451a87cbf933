//! The `today()`/`now()` collaborator (§6). Injectable so date/time builtins
//! are deterministic in tests; `SystemClock` is the only ambient-time source
//! in the crate, gated behind nothing (the core performs no I/O either way).

use chrono::{NaiveDate, NaiveDateTime};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> NaiveDateTime;
}

/// Reads the OS clock. The only part of this crate that touches ambient state.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A pinned instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    date: NaiveDate,
    datetime: NaiveDateTime,
}

impl FixedClock {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self {
            date: datetime.date(),
            datetime,
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date,
            datetime: date.and_hms_opt(0, 0, 0).unwrap(),
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now(&self) -> NaiveDateTime {
        self.datetime
    }
}
