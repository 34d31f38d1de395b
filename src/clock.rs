use chrono::{DateTime, Datelike, Local, Utc, Weekday};

/// Source of wall-clock time for rollover gating and cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn weekday(&self) -> Weekday {
        self.now().weekday()
    }
}

/// Reads the system clock; the weekday follows the local timezone, since a
/// school day ends locally.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn weekday(&self) -> Weekday {
        Local::now().weekday()
    }
}
