/*!
 # Week-relative clock arithmetic

 Schedules are expressed as points in a recurring week of 7 x 1440 minutes,
 independent of any calendar date. This module maps local wall-clock
 timestamps onto that cycle and projects cycle points back onto concrete
 timestamps.

 All arithmetic is done on [`NaiveDateTime`] (local civil time). Days are
 numbered with Monday = 0 through Sunday = 6.
*/

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike};
use std::fmt;
use thiserror::Error;

/// Minutes in one day
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Days in one week cycle
pub const DAYS_PER_WEEK: u32 = 7;

/// Minutes in one full week cycle
pub const MINUTES_PER_WEEK: u32 = MINUTES_PER_DAY * DAYS_PER_WEEK;

/// Format used for timestamps in outbound payloads
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ACCEPTED_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Errors raised while turning input into usable timestamps
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// Input could not be read as a timestamp
    #[error("Unparseable timestamp '{0}'")]
    Unparseable(String),

    /// Local time does not exist in the host timezone (e.g. skipped by DST)
    #[error("Local time {0} does not exist in the current timezone")]
    NonexistentLocalTime(NaiveDateTime),

    /// Arithmetic left the representable calendar range
    #[error("Timestamp arithmetic out of range near {0}")]
    OutOfRange(NaiveDateTime),
}

/// A point in the recurring week cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekTimePoint {
    day: u8,
    minute: u16,
}

impl WeekTimePoint {
    /// Creates a point from a Monday-based day index (0-6) and minute of day (0-1439).
    ///
    /// Returns `None` when either value is out of range.
    pub fn new(day: u8, minute: u16) -> Option<Self> {
        if u32::from(day) < DAYS_PER_WEEK && u32::from(minute) < MINUTES_PER_DAY {
            Some(Self { day, minute })
        } else {
            None
        }
    }

    /// Creates a point from minutes since Monday 00:00, wrapping at the end of the week
    pub fn from_week_minute(week_minute: u32) -> Self {
        let week_minute = week_minute % MINUTES_PER_WEEK;
        Self {
            day: (week_minute / MINUTES_PER_DAY) as u8,
            minute: (week_minute % MINUTES_PER_DAY) as u16,
        }
    }

    /// Day of week, Monday = 0
    pub fn day(&self) -> u8 {
        self.day
    }

    /// Minute of day
    pub fn minute(&self) -> u16 {
        self.minute
    }

    /// Minutes since Monday 00:00
    pub fn week_minute(&self) -> u32 {
        u32::from(self.day) * MINUTES_PER_DAY + u32::from(self.minute)
    }

    /// Forward distance in minutes from `self` to `other` around the week cycle.
    ///
    /// Always in `0..MINUTES_PER_WEEK`; zero when both points are equal.
    pub fn minutes_until(&self, other: WeekTimePoint) -> u32 {
        (other.week_minute() + MINUTES_PER_WEEK - self.week_minute()) % MINUTES_PER_WEEK
    }
}

impl fmt::Display for WeekTimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}",
            DAY_NAMES[usize::from(self.day)],
            self.minute / 60,
            self.minute % 60
        )
    }
}

/// Maps a wall-clock timestamp to its position in the week cycle.
///
/// Seconds are ignored; the cycle has minute resolution.
pub fn to_week_point(instant: &NaiveDateTime) -> WeekTimePoint {
    WeekTimePoint {
        day: instant.weekday().num_days_from_monday() as u8,
        minute: (instant.hour() * 60 + instant.minute()) as u16,
    }
}

/// Returns the earliest minute-aligned timestamp at or after `reference`
/// (truncated to its minute) whose week point equals `point`.
///
/// When the reference already sits on `point` the result is the reference's
/// own minute, not next week's occurrence.
pub fn project_forward(
    point: WeekTimePoint,
    reference: &NaiveDateTime,
) -> Result<NaiveDateTime, ClockError> {
    let anchor = truncate_to_minute(reference);
    let ahead = to_week_point(&anchor).minutes_until(point);
    anchor
        .checked_add_signed(Duration::minutes(i64::from(ahead)))
        .ok_or(ClockError::OutOfRange(*reference))
}

/// Shifts a timestamp by a number of whole minutes, failing at the calendar edges
pub(crate) fn shift_minutes(
    instant: &NaiveDateTime,
    minutes: i64,
) -> Result<NaiveDateTime, ClockError> {
    instant
        .checked_add_signed(Duration::minutes(minutes))
        .ok_or(ClockError::OutOfRange(*instant))
}

fn truncate_to_minute(instant: &NaiveDateTime) -> NaiveDateTime {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*instant)
}

/// Parses a local timestamp such as `2024-03-18T08:30` or `2024-03-18 08:30:15`
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, ClockError> {
    let trimmed = input.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ClockError::Unparseable(input.to_string()))
}

/// Attaches a timezone to a wall-clock time, picking the earlier instant when ambiguous
pub fn resolve_local<Tz: TimeZone>(
    tz: &Tz,
    wall_time: &NaiveDateTime,
) -> Result<DateTime<Tz>, ClockError> {
    tz.from_local_datetime(wall_time)
        .earliest()
        .ok_or(ClockError::NonexistentLocalTime(*wall_time))
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS`
pub fn format_timestamp(instant: &NaiveDateTime) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}
