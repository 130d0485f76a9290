/*!
 # Weekly recurring schedule matching

 A [`Schedule`] is an ordered set of [`ScheduledEvent`]s, each one a window
 on the recurring week cycle. Windows may wrap past Sunday midnight, and
 overlapping windows behave as their union.

 Matching works on the current occurrence of each window: the end point is
 projected forward from the reference instant and the start is found by
 walking back the window's length. The tested interval is therefore always
 a forward interval, whether or not the window wraps the week.
*/

use chrono::NaiveDateTime;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::trace;

use crate::clock::{
    format_timestamp, project_forward, shift_minutes, ClockError, WeekTimePoint, MINUTES_PER_DAY,
    MINUTES_PER_WEEK,
};

/// A set of weekdays stored as a bitmask, Monday in the lowest bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySet(u8);

impl DaySet {
    /// Monday (0x01)
    pub const MONDAY: DaySet = DaySet(0x01);
    /// Tuesday (0x02)
    pub const TUESDAY: DaySet = DaySet(0x02);
    /// Wednesday (0x04)
    pub const WEDNESDAY: DaySet = DaySet(0x04);
    /// Thursday (0x08)
    pub const THURSDAY: DaySet = DaySet(0x08);
    /// Friday (0x10)
    pub const FRIDAY: DaySet = DaySet(0x10);
    /// Saturday (0x20)
    pub const SATURDAY: DaySet = DaySet(0x20);
    /// Sunday (0x40)
    pub const SUNDAY: DaySet = DaySet(0x40);
    /// All days (0x7F)
    pub const ALL: DaySet = DaySet(0x7f);
    /// Week days (Monday-Friday, 0x1F)
    pub const WEEK_DAYS: DaySet = DaySet(0x1f);
    /// Weekend days (Saturday-Sunday, 0x60)
    pub const WEEKEND_DAYS: DaySet = DaySet(0x60);
    /// No days (0x00)
    pub const NONE: DaySet = DaySet(0x00);

    /// Raw bitmask
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether the Monday-based day index is part of the set
    pub fn contains(self, day: u8) -> bool {
        day < 7 && self.0 & (1 << day) != 0
    }

    /// Monday-based day indices in the set, in week order
    pub fn days(self) -> impl Iterator<Item = u8> {
        (0..7).filter(move |day| self.contains(*day))
    }

    pub fn union(self, other: DaySet) -> DaySet {
        DaySet(self.0 | other.0)
    }
}

/// A day name that could not be interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown day '{0}' (expected mon..sun, all, weekdays or weekend)")]
pub struct UnknownDay(pub String);

impl FromStr for DaySet {
    type Err = UnknownDay;

    /// Parses a day name, a group name or a comma separated list of either
    fn from_str(days: &str) -> Result<Self, Self::Err> {
        let result = match days.trim().to_lowercase().as_str() {
            "mon" | "monday" => DaySet::MONDAY,
            "tue" | "tuesday" => DaySet::TUESDAY,
            "wed" | "wednesday" => DaySet::WEDNESDAY,
            "thu" | "thursday" => DaySet::THURSDAY,
            "fri" | "friday" => DaySet::FRIDAY,
            "sat" | "saturday" => DaySet::SATURDAY,
            "sun" | "sunday" => DaySet::SUNDAY,
            "all" => DaySet::ALL,
            "weekdays" => DaySet::WEEK_DAYS,
            "weekend" => DaySet::WEEKEND_DAYS,
            composite if composite.contains(',') => {
                let mut combined = DaySet::NONE;
                for day in composite.split(',') {
                    combined = combined.union(day.parse()?);
                }
                combined
            }
            _ => return Err(UnknownDay(days.to_string())),
        };

        trace!("Days '{}' parsed to bitmask: {:#04x}", days, result.0);
        Ok(result)
    }
}

/// One recurring weekly window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    start: WeekTimePoint,
    end: WeekTimePoint,
    whole_week: bool,
}

impl ScheduledEvent {
    /// Window from `start` up to (not including) `end`.
    ///
    /// An `end` before `start` wraps past the end of the week. Equal points
    /// give an empty window that never matches.
    pub fn new(start: WeekTimePoint, end: WeekTimePoint) -> Self {
        Self {
            start,
            end,
            whole_week: false,
        }
    }

    /// Window covering the entire week, nominally starting and ending at `anchor`
    pub fn whole_week(anchor: WeekTimePoint) -> Self {
        Self {
            start: anchor,
            end: anchor,
            whole_week: true,
        }
    }

    pub fn start(&self) -> WeekTimePoint {
        self.start
    }

    pub fn end(&self) -> WeekTimePoint {
        self.end
    }

    pub fn is_whole_week(&self) -> bool {
        self.whole_week
    }

    /// Length of the window in minutes
    pub fn length_minutes(&self) -> u32 {
        if self.whole_week {
            MINUTES_PER_WEEK
        } else {
            self.start.minutes_until(self.end)
        }
    }

    /// Zero-length windows never match and never produce transitions
    pub fn is_empty(&self) -> bool {
        self.length_minutes() == 0
    }

    /// The occurrence that is running at `reference`, or else the next one to start.
    ///
    /// An occurrence whose end equals the reference minute is still returned;
    /// it is over, since windows exclude their end.
    pub fn occurrence(&self, reference: &NaiveDateTime) -> Result<Occurrence, ClockError> {
        let end = project_forward(self.end, reference)?;
        let start = shift_minutes(&end, -i64::from(self.length_minutes()))?;
        Ok(Occurrence { start, end })
    }

    /// Whether `reference` falls inside this window
    pub fn contains(&self, reference: &NaiveDateTime) -> Result<bool, ClockError> {
        if self.whole_week {
            return Ok(true);
        }
        if self.is_empty() {
            return Ok(false);
        }
        Ok(self.occurrence(reference)?.contains(reference))
    }

    /// Nearest on and off boundaries at or after `reference`
    fn boundaries(&self, reference: &NaiveDateTime) -> Result<[Transition; 2], ClockError> {
        Ok([
            Transition {
                instant: not_before(project_forward(self.start, reference)?, reference)?,
                will_turn_on: true,
            },
            Transition {
                instant: not_before(self.occurrence(reference)?.end, reference)?,
                will_turn_on: false,
            },
        ])
    }
}

/// A boundary in the reference's own minute has already passed when the
/// reference carries seconds; it recurs a week later.
fn not_before(
    boundary: NaiveDateTime,
    reference: &NaiveDateTime,
) -> Result<NaiveDateTime, ClockError> {
    if boundary < *reference {
        shift_minutes(&boundary, i64::from(MINUTES_PER_WEEK))
    } else {
        Ok(boundary)
    }
}

/// Concrete timestamps of one occurrence of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Occurrence {
    pub fn contains(&self, instant: &NaiveDateTime) -> bool {
        self.start <= *instant && *instant < self.end
    }

    /// `{start, end}` pair in payload form
    pub fn formatted(&self) -> FormattedOccurrence {
        FormattedOccurrence {
            start: format_timestamp(&self.start),
            end: format_timestamp(&self.end),
        }
    }
}

/// Occurrence with both ends rendered as timestamp strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedOccurrence {
    pub start: String,
    pub end: String,
}

/// A schedule boundary where the output changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub instant: NaiveDateTime,
    pub will_turn_on: bool,
}

impl Transition {
    /// `ON` or `OFF`
    pub fn label(&self) -> &'static str {
        if self.will_turn_on {
            "ON"
        } else {
            "OFF"
        }
    }
}

/// Ordered collection of weekly windows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    events: Vec<ScheduledEvent>,
}

impl Schedule {
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    /// Adds the same daily window to every day in `days`.
    ///
    /// `on` and `off` are minutes of day; an `off` not after `on` ends on the
    /// following day.
    pub fn push_daily(&mut self, days: DaySet, on: u16, off: u16) {
        for day in days.days() {
            let start = WeekTimePoint::from_week_minute(
                u32::from(day) * MINUTES_PER_DAY + u32::from(on),
            );
            let end_day = if off > on { day } else { day + 1 };
            let end = WeekTimePoint::from_week_minute(
                u32::from(end_day) * MINUTES_PER_DAY + u32::from(off),
            );
            self.events.push(ScheduledEvent::new(start, end));
        }
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether any window contains `reference`
    pub fn is_active(&self, reference: &NaiveDateTime) -> Result<bool, ClockError> {
        for event in &self.events {
            if event.contains(reference)? {
                trace!("{} - {} matches {}", event.start, event.end, reference);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Earliest window boundary at or after `reference`.
    ///
    /// A start wins over an end at the same instant. Empty and whole-week
    /// windows have no boundaries.
    pub fn next_transition(
        &self,
        reference: &NaiveDateTime,
    ) -> Result<Option<Transition>, ClockError> {
        let mut earliest: Option<Transition> = None;
        for event in &self.events {
            if event.whole_week || event.is_empty() {
                continue;
            }
            for candidate in event.boundaries(reference)? {
                let better = match earliest {
                    None => true,
                    Some(current) => {
                        (candidate.instant, !candidate.will_turn_on)
                            < (current.instant, !current.will_turn_on)
                    }
                };
                if better {
                    earliest = Some(candidate);
                }
            }
        }
        Ok(earliest)
    }

    /// Current-or-next occurrence of every window, ordered by start
    pub fn upcoming(&self, reference: &NaiveDateTime) -> Result<Vec<Occurrence>, ClockError> {
        let mut occurrences = self
            .events
            .iter()
            .map(|event| event.occurrence(reference))
            .collect::<Result<Vec<_>, _>>()?;
        occurrences.sort_by_key(|occurrence| occurrence.start);
        Ok(occurrences)
    }
}

impl FromIterator<ScheduledEvent> for Schedule {
    fn from_iter<I: IntoIterator<Item = ScheduledEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_timestamp;

    fn at(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn point(day: u8, hour: u16, minute: u16) -> WeekTimePoint {
        WeekTimePoint::new(day, hour * 60 + minute).unwrap()
    }

    fn single(start: WeekTimePoint, end: WeekTimePoint) -> Schedule {
        Schedule::new(vec![ScheduledEvent::new(start, end)])
    }

    // 2024-01-01 is a Monday, 2024-01-07 a Sunday

    #[test]
    fn test_parse_days() {
        assert_eq!("mon".parse::<DaySet>().unwrap(), DaySet::MONDAY);
        assert_eq!("Weekend".parse::<DaySet>().unwrap(), DaySet::WEEKEND_DAYS);
        assert_eq!(
            "mon, wed,sun".parse::<DaySet>().unwrap().bits(),
            0x01 | 0x04 | 0x40
        );
        assert_eq!(
            "mon,funday".parse::<DaySet>(),
            Err(UnknownDay("funday".to_string()))
        );
        assert_eq!(DaySet::WEEK_DAYS.days().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_simple_window() {
        let schedule = single(point(0, 8, 0), point(0, 10, 0));
        assert!(!schedule.is_active(&at("2024-01-01T07:59:59")).unwrap());
        assert!(schedule.is_active(&at("2024-01-01T08:00")).unwrap());
        assert!(schedule.is_active(&at("2024-01-01T09:00")).unwrap());
        assert!(schedule.is_active(&at("2024-01-01T09:59:59")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-01T10:00")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-02T09:00")).unwrap());
    }

    #[test]
    fn test_window_across_midnight() {
        let schedule = single(point(4, 23, 0), point(5, 1, 0));
        assert!(schedule.is_active(&at("2024-01-05T23:30")).unwrap());
        assert!(schedule.is_active(&at("2024-01-06T00:30")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-06T01:00")).unwrap());
    }

    #[test]
    fn test_wraparound_window() {
        let schedule = single(point(6, 23, 50), point(0, 0, 10));
        assert!(schedule.is_active(&at("2024-01-07T23:55")).unwrap());
        assert!(schedule.is_active(&at("2024-01-08T00:05")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-08T00:15")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-07T23:45")).unwrap());
    }

    #[test]
    fn test_zero_length_never_matches() {
        let schedule = single(point(2, 12, 0), point(2, 12, 0));
        assert!(!schedule.is_active(&at("2024-01-03T12:00")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-03T12:00:30")).unwrap());
        assert_eq!(schedule.next_transition(&at("2024-01-03T11:00")).unwrap(), None);
    }

    #[test]
    fn test_whole_week_always_active() {
        let schedule = Schedule::new(vec![ScheduledEvent::whole_week(point(0, 0, 0))]);
        for s in ["2024-01-01T00:00", "2024-01-03T12:00", "2024-01-07T23:59:59"] {
            assert!(schedule.is_active(&at(s)).unwrap(), "inactive at {s}");
        }
        assert_eq!(schedule.next_transition(&at("2024-01-03T12:00")).unwrap(), None);
    }

    #[test]
    fn test_overlapping_windows_union() {
        let schedule = Schedule::new(vec![
            ScheduledEvent::new(point(0, 8, 0), point(0, 12, 0)),
            ScheduledEvent::new(point(0, 11, 0), point(0, 14, 0)),
        ]);
        assert!(schedule.is_active(&at("2024-01-01T13:00")).unwrap());
        assert!(!schedule.is_active(&at("2024-01-01T14:00")).unwrap());
    }

    #[test]
    fn test_next_transition_inside_window_is_end() {
        let schedule = single(point(0, 8, 0), point(0, 10, 0));
        let next = schedule.next_transition(&at("2024-01-01T09:00")).unwrap().unwrap();
        assert_eq!(next.instant, at("2024-01-01T10:00"));
        assert!(!next.will_turn_on);
        assert_eq!(next.label(), "OFF");
    }

    #[test]
    fn test_next_transition_after_window_is_next_week() {
        let schedule = single(point(0, 8, 0), point(0, 10, 0));
        let next = schedule.next_transition(&at("2024-01-01T11:00")).unwrap().unwrap();
        assert_eq!(next.instant, at("2024-01-08T08:00"));
        assert!(next.will_turn_on);
    }

    #[test]
    fn test_next_transition_start_wins_tie() {
        let schedule = Schedule::new(vec![
            ScheduledEvent::new(point(0, 8, 0), point(0, 10, 0)),
            ScheduledEvent::new(point(0, 10, 0), point(0, 12, 0)),
        ]);
        let next = schedule.next_transition(&at("2024-01-01T09:00")).unwrap().unwrap();
        assert_eq!(next.instant, at("2024-01-01T10:00"));
        assert!(next.will_turn_on);
    }

    #[test]
    fn test_next_transition_within_boundary_minute() {
        let schedule = single(point(0, 8, 0), point(0, 10, 0));

        // Already on since 08:00:00, so the next change is the end
        let next = schedule.next_transition(&at("2024-01-01T08:00:30")).unwrap().unwrap();
        assert_eq!(next.instant, at("2024-01-01T10:00"));
        assert!(!next.will_turn_on);

        // Off since 10:00:00, so the next change is next week's start
        let next = schedule.next_transition(&at("2024-01-01T10:00:30")).unwrap().unwrap();
        assert_eq!(next.instant, at("2024-01-08T08:00"));
        assert!(next.will_turn_on);

        // On the exact minute the boundary is still reported
        let next = schedule.next_transition(&at("2024-01-01T08:00")).unwrap().unwrap();
        assert_eq!(next.instant, at("2024-01-01T08:00"));
        assert!(next.will_turn_on);
    }

    #[test]
    fn test_next_transition_empty_schedule() {
        assert_eq!(Schedule::default().next_transition(&at("2024-01-01T09:00")).unwrap(), None);
    }

    #[test]
    fn test_push_daily_wraps_to_next_day() {
        let mut schedule = Schedule::default();
        schedule.push_daily(DaySet::SUNDAY, 22 * 60, 2 * 60);
        assert_eq!(
            schedule.events(),
            &[ScheduledEvent::new(point(6, 22, 0), point(0, 2, 0))]
        );
        assert!(schedule.is_active(&at("2024-01-08T01:00")).unwrap());
    }

    #[test]
    fn test_upcoming_sorted_and_rolled_forward() {
        let schedule = Schedule::new(vec![
            ScheduledEvent::new(point(4, 18, 0), point(4, 20, 0)),
            ScheduledEvent::new(point(0, 8, 0), point(0, 9, 0)),
            ScheduledEvent::new(point(2, 8, 0), point(2, 9, 0)),
        ]);
        let upcoming = schedule.upcoming(&at("2024-01-03T08:30")).unwrap();
        let starts: Vec<_> = upcoming.iter().map(|o| o.formatted().start).collect();
        assert_eq!(
            starts,
            vec![
                "2024-01-03T08:00:00",
                "2024-01-05T18:00:00",
                "2024-01-08T08:00:00"
            ]
        );
    }
}
