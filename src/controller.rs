/*!
 # Scheduler node

 [`Controller`] is the host-facing side of the scheduler. It owns the
 validated configuration and the operator's override mode, turns commands
 and timer ticks into outbound messages, and renders a status line.
*/

use chrono::{DateTime, TimeZone};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::clock::{format_timestamp, ClockError};
use crate::command::{Command, CommandParseError};
use crate::config::{Config, OutputFrequency};
use crate::mode::{decide, Decision, OverrideMode};
use crate::schedule::{FormattedOccurrence, Transition};
use crate::solar;
use crate::Result;

/// Outbound channel a message is delivered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// On/off state output
    State,
    /// Replies to `info` and `next`
    Query,
}

/// A message for the host to deliver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub topic: String,
    pub payload: Value,
}

/// Status indicator color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    Green,
    Red,
    Gray,
}

/// Short human readable state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub fill: StatusFill,
    pub text: String,
}

/// Result of one evaluation after the output policy was applied
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub status: Status,
    /// State message, absent when stopped or suppressed as unchanged
    pub message: Option<OutboundMessage>,
}

/// Everything a command caused
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reaction {
    pub messages: Vec<OutboundMessage>,
    pub status: Option<Status>,
    /// Set when the input was not understood
    pub warning: Option<CommandParseError>,
}

impl From<Evaluation> for Reaction {
    fn from(evaluation: Evaluation) -> Self {
        Reaction {
            messages: evaluation.message.into_iter().collect(),
            status: Some(evaluation.status),
            warning: None,
        }
    }
}

#[derive(Debug, Default)]
struct NodeState {
    mode: OverrideMode,
    previous_payload: Option<Value>,
}

/// Schedule and sun driven on/off controller
#[derive(Debug)]
pub struct Controller {
    config: Config,
    state: Mutex<NodeState>,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(NodeState::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current override mode
    pub fn mode(&self) -> OverrideMode {
        self.state.lock().mode
    }

    /// Whether the host should evaluate once right after startup
    pub fn evaluate_on_startup(&self) -> bool {
        self.config.output_frequency != OutputFrequency::StateChange
    }

    /// Applies one inbound command.
    ///
    /// Unrecognised input is reported in [`Reaction::warning`] and answered
    /// with a normal evaluation.
    #[instrument(skip(self, now))]
    pub fn handle_command<Tz: TimeZone>(
        &self,
        input: &str,
        now: &DateTime<Tz>,
    ) -> Result<Reaction> {
        match input.parse::<Command>() {
            Ok(Command::SetMode(mode)) => {
                self.state.lock().mode = mode;
                info!("Override set to {}", mode);
                Ok(self.evaluate(now)?.into())
            }
            Ok(Command::Info) => {
                let payload = serde_json::to_value(self.upcoming(now)?)?;
                Ok(Reaction {
                    messages: vec![self.message(Channel::Query, payload)],
                    ..Reaction::default()
                })
            }
            Ok(Command::Next) => {
                let payload = match self.next_event(now)? {
                    Some(transition) => json!({
                        "event": transition.label(),
                        "time": format_timestamp(&transition.instant),
                    }),
                    None => Value::String("no event".to_string()),
                };
                Ok(Reaction {
                    messages: vec![self.message(Channel::Query, payload)],
                    ..Reaction::default()
                })
            }
            Err(e) => {
                warn!("Failed to interpret input: {}. Ignoring it!", e);
                let mut reaction: Reaction = self.evaluate(now)?.into();
                reaction.warning = Some(e);
                Ok(reaction)
            }
        }
    }

    /// Evaluates the output state at `now` and applies the output frequency policy
    #[instrument(skip(self, now))]
    pub fn evaluate<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Evaluation> {
        // Snapshot the mode so a concurrent command cannot change it mid-evaluation
        let mode = self.mode();
        let decision = decide(
            mode,
            &self.config.schedule,
            &self.config.location,
            self.config.sun_elevation_threshold,
            self.config.only_when_dark,
            now,
        )?;

        let result = match decision {
            Decision::Stopped => {
                debug!("Stopped, nothing to emit");
                return Ok(Evaluation {
                    decision,
                    status: Status {
                        fill: StatusFill::Gray,
                        text: "Override: Stopped!".to_string(),
                    },
                    message: None,
                });
            }
            Decision::Output(result) => result,
        };

        let payload = if result.output_on {
            self.config.on_payload.clone()
        } else {
            self.config.off_payload.clone()
        };

        let message = {
            let mut state = self.state.lock();
            let changed = state.previous_payload.as_ref() != Some(&payload);
            if changed || self.config.output_frequency == OutputFrequency::EveryEvaluation {
                state.previous_payload = Some(payload.clone());
                Some(self.message(Channel::State, payload))
            } else {
                None
            }
        };

        let status = self.status(mode, result.output_on, result.next_transition, now);
        debug!("Evaluated {}: {}", mode, status.text);
        Ok(Evaluation {
            decision,
            status,
            message,
        })
    }

    /// Current-or-next occurrence of every window, ordered by start
    pub fn upcoming<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> std::result::Result<Vec<FormattedOccurrence>, ClockError> {
        Ok(self
            .config
            .schedule
            .upcoming(&now.naive_local())?
            .iter()
            .map(|occurrence| occurrence.formatted())
            .collect())
    }

    /// Next schedule boundary, regardless of the override mode
    pub fn next_event<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> std::result::Result<Option<Transition>, ClockError> {
        self.config.schedule.next_transition(&now.naive_local())
    }

    fn message(&self, channel: Channel, payload: Value) -> OutboundMessage {
        OutboundMessage {
            channel,
            topic: self.config.topic.clone(),
            payload,
        }
    }

    fn status<Tz: TimeZone>(
        &self,
        mode: OverrideMode,
        output_on: bool,
        next_transition: Option<Transition>,
        now: &DateTime<Tz>,
    ) -> Status {
        let mut text = String::from(if output_on { "ON" } else { "OFF" });

        if self.config.show_elevation_in_status {
            let elevation = solar::elevation(&self.config.location, now);
            text.push_str(&format!("  Sun: {:.1}°", elevation));
        }
        if mode != OverrideMode::Auto {
            text.push_str(&format!("  Override: {}", mode));
        }
        if let Some(transition) = next_transition {
            text.push_str(&format!(
                " {} @{}",
                transition.label(),
                transition.instant.format("%H:%M")
            ));
        }

        Status {
            fill: if output_on {
                StatusFill::Green
            } else {
                StatusFill::Red
            },
            text,
        }
    }
}
