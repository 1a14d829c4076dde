//! Weekly check-window triggers.
//!
//! The scheduler is evaluated on a periodic tick rather than armed with
//! timers. Each trigger is a fixed weekday/hour/minute in a fixed UTC offset
//! and fires when a tick lands inside that minute.
//!
//! ## Firing rules
//!
//! - Boundary only: a tick that misses the trigger minute never fires it late.
//! - At most once per minute: two ticks within the same trigger minute fire once.
//!
//! ```ignore
//! let mut scheduler = TickScheduler::new(config.check_schedule()?);
//! for kind in scheduler.evaluate(Utc::now()) {
//!     // start or end the round
//! }
//! ```

mod runner;

pub use runner::{run_tick, run_tick_loop, Clock, SystemClock};

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Parse a weekday name (`saturday`, `Sat`, ...).
pub fn parse_weekday(value: &str) -> Result<Weekday, ValidationError> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| ValidationError::InvalidWeekday(value.to_string()))
}

/// A weekday and wall-clock minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTrigger {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

impl WeeklyTrigger {
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour >= 24 || minute >= 60 {
            return Err(ValidationError::InvalidTime { hour, minute });
        }
        Ok(Self {
            weekday,
            hour,
            minute,
        })
    }

    pub fn matches(&self, local: &DateTime<FixedOffset>) -> bool {
        local.weekday() == self.weekday && local.hour() == self.hour && local.minute() == self.minute
    }
}

impl std::fmt::Display for WeeklyTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:02}:{:02}", self.weekday, self.hour, self.minute)
    }
}

/// Start and end of the weekly check window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSchedule {
    pub offset: FixedOffset,
    pub start: WeeklyTrigger,
    pub end: WeeklyTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StartRound,
    EndRound,
}

#[derive(Debug, Clone)]
pub struct TickScheduler {
    schedule: CheckSchedule,
    /// Minute (seconds since epoch / 60) each trigger last fired in.
    last_start: Option<i64>,
    last_end: Option<i64>,
}

impl TickScheduler {
    pub fn new(schedule: CheckSchedule) -> Self {
        Self {
            schedule,
            last_start: None,
            last_end: None,
        }
    }

    pub fn schedule(&self) -> &CheckSchedule {
        &self.schedule
    }

    pub fn offset(&self) -> FixedOffset {
        self.schedule.offset
    }

    /// Triggers due at `now`. Start comes before end when both share a minute.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Vec<TriggerKind> {
        let local = now.with_timezone(&self.schedule.offset);
        let minute = now.timestamp().div_euclid(60);
        let mut due = Vec::new();

        if self.schedule.start.matches(&local) && self.last_start != Some(minute) {
            self.last_start = Some(minute);
            due.push(TriggerKind::StartRound);
        }
        if self.schedule.end.matches(&local) && self.last_end != Some(minute) {
            self.last_end = Some(minute);
            due.push(TriggerKind::EndRound);
        }
        due
    }
}
