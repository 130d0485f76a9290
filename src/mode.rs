/*!
 # Override modes and the on/off decision

 The operator selects an [`OverrideMode`]; [`decide`] combines it with the
 schedule and the sun to produce the output state.
*/

use chrono::{DateTime, TimeZone};
use std::fmt;

use crate::clock::ClockError;
use crate::schedule::{Schedule, Transition};
use crate::solar::{self, GeoLocation};

/// Operator override selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverrideMode {
    /// Schedule decides, optionally narrowed to darkness
    #[default]
    Auto,
    /// Forced on
    On,
    /// Forced off
    Off,
    /// Evaluation halted, nothing is emitted
    Stop,
    /// Schedule decides, sun ignored
    ScheduleOnly,
    /// Darkness decides, schedule ignored
    LightOnly,
}

impl OverrideMode {
    /// Name used in commands and status text
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideMode::Auto => "auto",
            OverrideMode::On => "on",
            OverrideMode::Off => "off",
            OverrideMode::Stop => "stop",
            OverrideMode::ScheduleOnly => "schedule-only",
            OverrideMode::LightOnly => "light-only",
        }
    }
}

impl fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output state plus, in auto mode, the next schedule boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationResult {
    pub output_on: bool,
    pub next_transition: Option<Transition>,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stop mode: no output state is asserted
    Stopped,
    Output(EvaluationResult),
}

impl Decision {
    /// Output state, `None` when stopped
    pub fn output_on(&self) -> Option<bool> {
        match self {
            Decision::Stopped => None,
            Decision::Output(result) => Some(result.output_on),
        }
    }
}

/// Decides the output state for `reference`.
///
/// The sun is only consulted when the mode needs it, and the next transition
/// is only computed in auto mode.
pub fn decide<Tz: TimeZone>(
    mode: OverrideMode,
    schedule: &Schedule,
    location: &GeoLocation,
    threshold_degrees: f64,
    only_when_dark: bool,
    reference: &DateTime<Tz>,
) -> Result<Decision, ClockError> {
    let wall_time = reference.naive_local();
    let output = |output_on| {
        Decision::Output(EvaluationResult {
            output_on,
            next_transition: None,
        })
    };

    let decision = match mode {
        OverrideMode::Stop => Decision::Stopped,
        OverrideMode::On => output(true),
        OverrideMode::Off => output(false),
        OverrideMode::ScheduleOnly => output(schedule.is_active(&wall_time)?),
        OverrideMode::LightOnly => output(solar::is_dark(location, reference, threshold_degrees)),
        OverrideMode::Auto => {
            let output_on = schedule.is_active(&wall_time)?
                && (!only_when_dark || solar::is_dark(location, reference, threshold_degrees));
            Decision::Output(EvaluationResult {
                output_on,
                next_transition: schedule.next_transition(&wall_time)?,
            })
        }
    };
    Ok(decision)
}
