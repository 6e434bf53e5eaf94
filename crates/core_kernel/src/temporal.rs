//! Calendar handling for leave periods and the clinic's notion of "today"
//!
//! Leave status depends on the calendar date at the clinic, not on UTC, so
//! every date-driven recomputation takes its `today` from a [`Clock`].

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

/// Timezone wrapper for the clinic's location
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::from_name(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA timezone name such as `Asia/Riyadh`
    pub fn from_name(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(name.to_string()))
    }

    /// Returns the calendar date of `utc` in this timezone
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.0).date_naive()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: end {end} is before start {start}")]
    InvalidPeriod {
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// An inclusive calendar date range
///
/// Both endpoints count, so a range from Jan 1 to Jan 5 spans five days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `end < start`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if end < start {
            return Err(TemporalError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days covered, counting both endpoints
    pub fn inclusive_days(&self) -> u32 {
        // end >= start is guaranteed by the constructor
        ((self.end - self.start).num_days() + 1) as u32
    }
}

/// Source of the current instant and the clinic's current date
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;

    /// The current calendar date at the clinic
    fn today(&self) -> NaiveDate;
}

/// Wall clock reading dates in the clinic's timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct ClinicClock {
    timezone: Timezone,
}

impl ClinicClock {
    pub fn new(timezone: Timezone) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Timezone {
        self.timezone
    }
}

impl Clock for ClinicClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        self.timezone.local_date(Utc::now())
    }
}

/// A clock frozen at a given instant, for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    timezone: Timezone,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now, timezone: Timezone::default() }
    }

    /// A clock whose clinic date is `date` (noon UTC)
    pub fn on_date(date: NaiveDate) -> Self {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Self::new(noon)
    }

    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.timezone.local_date(self.now)
    }
}
