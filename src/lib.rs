/*!
 # Light Scheduler

 A Rust library that decides whether a light (or any other on/off output)
 should be on, from a weekly schedule, the sun's elevation at a location
 and an operator override.

 ## Features

 * Recurring weekly windows, including windows that wrap past Sunday midnight
 * Sun elevation based darkness detection with a configurable threshold
 * Override modes: auto, on, off, stop, schedule-only, light-only
 * Next transition and upcoming window reporting
 * TOML configuration

 ## Example

 ```rust
 use chrono::{TimeZone, Utc};
 use light_scheduler::*;

 fn main() -> Result<()> {
     let config = Config::from_toml_str(
         r#"
         latitude = 59.33
         longitude = 18.07
         only_when_dark = true

         [[windows]]
         days = "weekdays"
         on = "16:00"
         off = "23:00"
         "#,
     )?;
     let controller = Controller::new(config);

     // 2024-01-03 is a Wednesday, and 17:00 is after sunset in Stockholm
     let now = Utc.with_ymd_and_hms(2024, 1, 3, 17, 0, 0).unwrap();
     let evaluation = controller.evaluate(&now)?;
     assert_eq!(evaluation.decision.output_on(), Some(true));
     println!("{}", evaluation.status.text);

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Error types for the light scheduler library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Timestamp could not be used for an evaluation
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Outbound message could not be serialized
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod clock;
pub mod command;
pub mod config;
pub mod controller;
pub mod mode;
pub mod schedule;
pub mod solar;

// Re-export key types
pub use clock::{ClockError, WeekTimePoint};
pub use command::{Command, CommandParseError};
pub use config::{Config, ConfigError, OutputFrequency};
pub use controller::{Channel, Controller, Evaluation, OutboundMessage, Reaction, Status, StatusFill};
pub use mode::{decide, Decision, EvaluationResult, OverrideMode};
pub use schedule::{DaySet, Schedule, ScheduledEvent, Transition};
pub use solar::GeoLocation;
