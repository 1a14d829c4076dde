//! Week keys: the `YYYY-Www` buckets completions are recorded under.
//!
//! Numbering follows ISO 8601: week 1 is the week containing the year's first
//! Thursday, and the year is the ISO week-year (so 2024-12-30 is `2025-W01`).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A (year, week-of-year) bucket.
///
/// Ordering is chronological and agrees with the ordering of the rendered
/// strings, which the store relies on for `ORDER BY week_key DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey {
    year: i32,
    week: u32,
}

/// Number of ISO weeks in `year` (52 or 53).
///
/// December 28 always falls in the last ISO week of its year.
pub fn last_iso_week(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(52)
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Result<Self, ValidationError> {
        if !(1000..=9999).contains(&year) || week == 0 || week > last_iso_week(year) {
            return Err(ValidationError::WeekOutOfRange { year, week });
        }
        Ok(Self { year, week })
    }

    /// The week containing `at`, evaluated in `at`'s own offset.
    pub fn containing<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        let iso = at.date_naive().iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// The week immediately before this one, rolling over to the last ISO
    /// week of the prior year from week 1.
    pub fn previous(&self) -> Self {
        if self.week > 1 {
            Self {
                year: self.year,
                week: self.week - 1,
            }
        } else {
            let year = self.year - 1;
            Self {
                year,
                week: last_iso_week(year),
            }
        }
    }

    /// The week immediately after this one.
    pub fn next(&self) -> Self {
        if self.week < last_iso_week(self.year) {
            Self {
                year: self.year,
                week: self.week + 1,
            }
        } else {
            Self {
                year: self.year + 1,
                week: 1,
            }
        }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidWeekKey(s.to_string());
        let (year, week) = s.split_once("-W").ok_or_else(invalid)?;
        if year.len() != 4 || week.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        Self::new(year, week)
    }
}

impl TryFrom<String> for WeekKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekKey> for String {
    fn from(key: WeekKey) -> Self {
        key.to_string()
    }
}

/// `previous_week_key("2025-W01") == "2024-W52"`.
pub fn previous_week_key(key: &str) -> Result<String, ValidationError> {
    Ok(key.parse::<WeekKey>()?.previous().to_string())
}
