/*!
 # Configuration

 Loads the scheduler settings from a TOML file and validates them into a
 [`Config`]. Everything the core receives has passed through here, so the
 core itself never re-validates.

 ```toml
 topic = "porch"
 latitude = 59.33
 longitude = 18.07
 only_when_dark = true
 sun_elevation_threshold = 6.0
 output_frequency = "state-change-startup"
 on_payload = true
 off_payload = false

 # Raw windows, days counted Sunday = 0
 [[events]]
 start = { dow = 1, mod = 1020 }
 end = { dow = 1, mod = 1380 }

 # Daily windows expanded over a set of days
 [[windows]]
 days = "weekdays"
 on = "17:00"
 off = "23:00"
 ```
*/

use chrono::{NaiveTime, Timelike};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::clock::{WeekTimePoint, DAYS_PER_WEEK, MINUTES_PER_DAY};
use crate::schedule::{DaySet, Schedule, ScheduledEvent, UnknownDay};
use crate::solar::GeoLocation;

/// Default sun elevation (degrees) below which it counts as dark
pub const DEFAULT_SUN_ELEVATION_THRESHOLD: f64 = 6.0;

/// Invalid or unreadable configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("events[{entry}]: day of week {value} out of range (0..7)")]
    DayOfWeek { entry: usize, value: i64 },

    #[error("events[{entry}]: minute of day {value} out of range (0..1440)")]
    MinuteOfDay { entry: usize, value: i64 },

    #[error("windows[{entry}]: {source}")]
    Days {
        entry: usize,
        #[source]
        source: UnknownDay,
    },

    #[error("windows[{entry}]: '{value}' is not a HH:MM time")]
    ClockTime { entry: usize, value: String },

    #[error("windows[{entry}]: missing '{field}' time")]
    MissingTime { entry: usize, field: &'static str },

    #[error("windows[{entry}]: on and off times are equal")]
    EmptyWindow { entry: usize },

    #[error("Invalid coordinates: latitude {latitude} (-90..90), longitude {longitude} (-180..180)")]
    Coordinates { latitude: f64, longitude: f64 },

    #[error("Sun elevation threshold must be a finite number of degrees, got {0}")]
    Threshold(f64),
}

/// When evaluations produce an outbound state message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFrequency {
    /// Emit on every evaluation
    #[serde(alias = "output.minutely")]
    EveryEvaluation,
    /// Emit only when the payload changes, first evaluation waits for the timer
    #[serde(alias = "output.statechange")]
    StateChange,
    /// Emit only when the payload changes, and evaluate right away at startup
    #[default]
    #[serde(alias = "output.statechange.startup")]
    StateChangeStartup,
}

/// Validated scheduler settings
#[derive(Debug, Clone)]
pub struct Config {
    pub topic: String,
    pub schedule: Schedule,
    pub location: GeoLocation,
    pub sun_elevation_threshold: f64,
    pub only_when_dark: bool,
    pub show_elevation_in_status: bool,
    pub output_frequency: OutputFrequency,
    pub on_payload: Value,
    pub off_payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    topic: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    only_when_dark: bool,
    #[serde(default = "default_threshold")]
    sun_elevation_threshold: f64,
    #[serde(default)]
    show_elevation_in_status: bool,
    #[serde(default)]
    output_frequency: OutputFrequency,
    #[serde(default = "default_on_payload")]
    on_payload: Value,
    #[serde(default = "default_off_payload")]
    off_payload: Value,
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    windows: Vec<RawWindow>,
}

/// Week point as stored by the node editor: Sunday-first day, minute of day
#[derive(Debug, Deserialize)]
struct RawPoint {
    dow: i64,
    #[serde(rename = "mod")]
    minute: i64,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    start: RawPoint,
    end: RawPoint,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWindow {
    #[serde(default = "default_days")]
    days: String,
    on: Option<String>,
    off: Option<String>,
    #[serde(default)]
    whole_week: bool,
}

fn default_threshold() -> f64 {
    DEFAULT_SUN_ELEVATION_THRESHOLD
}

fn default_on_payload() -> Value {
    Value::String("on".to_string())
}

fn default_off_payload() -> Value {
    Value::String("off".to_string())
}

fn default_days() -> String {
    "all".to_string()
}

impl Config {
    /// Reads and validates a config file
    #[instrument]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} schedule windows from {}",
            config.schedule.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parses and validates TOML config text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        raw.validate()
    }
}

impl RawConfig {
    fn validate(self) -> Result<Config, ConfigError> {
        let location = GeoLocation::new(self.latitude, self.longitude).ok_or(
            ConfigError::Coordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            },
        )?;

        if !self.sun_elevation_threshold.is_finite() {
            return Err(ConfigError::Threshold(self.sun_elevation_threshold));
        }

        let mut schedule = Schedule::default();
        for (entry, event) in self.events.iter().enumerate() {
            let start = point_from_sunday_first(entry, &event.start)?;
            let end = point_from_sunday_first(entry, &event.end)?;
            schedule.push(ScheduledEvent::new(start, end));
        }
        for (entry, window) in self.windows.iter().enumerate() {
            window.expand_into(entry, &mut schedule)?;
        }
        debug!("Schedule has {} windows", schedule.len());

        Ok(Config {
            topic: self.topic,
            schedule,
            location,
            sun_elevation_threshold: self.sun_elevation_threshold,
            only_when_dark: self.only_when_dark,
            show_elevation_in_status: self.show_elevation_in_status,
            output_frequency: self.output_frequency,
            on_payload: self.on_payload,
            off_payload: self.off_payload,
        })
    }
}

impl RawWindow {
    fn expand_into(&self, entry: usize, schedule: &mut Schedule) -> Result<(), ConfigError> {
        let days: DaySet = self
            .days
            .parse()
            .map_err(|source| ConfigError::Days { entry, source })?;

        if self.whole_week {
            // Nominal anchor only; a whole-week window has no boundaries
            schedule.push(ScheduledEvent::whole_week(WeekTimePoint::from_week_minute(0)));
            return Ok(());
        }

        let on = parse_clock_time(entry, self.on.as_deref(), "on")?;
        let off = parse_clock_time(entry, self.off.as_deref(), "off")?;
        if on == off {
            return Err(ConfigError::EmptyWindow { entry });
        }
        schedule.push_daily(days, on, off);
        Ok(())
    }
}

/// Converts a Sunday = 0 day index to the internal Monday = 0 convention.
///
/// This is the only place the two conventions meet.
fn point_from_sunday_first(entry: usize, raw: &RawPoint) -> Result<WeekTimePoint, ConfigError> {
    if !(0..i64::from(DAYS_PER_WEEK)).contains(&raw.dow) {
        return Err(ConfigError::DayOfWeek {
            entry,
            value: raw.dow,
        });
    }
    if !(0..i64::from(MINUTES_PER_DAY)).contains(&raw.minute) {
        return Err(ConfigError::MinuteOfDay {
            entry,
            value: raw.minute,
        });
    }
    let day = (raw.dow + 6) % 7;
    WeekTimePoint::new(day as u8, raw.minute as u16).ok_or(ConfigError::MinuteOfDay {
        entry,
        value: raw.minute,
    })
}

fn parse_clock_time(
    entry: usize,
    value: Option<&str>,
    field: &'static str,
) -> Result<u16, ConfigError> {
    let value = value.ok_or(ConfigError::MissingTime { entry, field })?;
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        ConfigError::ClockTime {
            entry,
            value: value.to_string(),
        }
    })?;
    Ok((time.hour() * 60 + time.minute()) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATION: &str = "latitude = 59.33\nlongitude = 18.07\n";

    fn parse(body: &str) -> Result<Config, ConfigError> {
        Config::from_toml_str(&format!("{LOCATION}{body}"))
    }

    fn point(day: u8, hour: u16, minute: u16) -> WeekTimePoint {
        WeekTimePoint::new(day, hour * 60 + minute).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.topic, "");
        assert!(config.schedule.is_empty());
        assert_eq!(config.sun_elevation_threshold, DEFAULT_SUN_ELEVATION_THRESHOLD);
        assert!(!config.only_when_dark);
        assert!(!config.show_elevation_in_status);
        assert_eq!(config.output_frequency, OutputFrequency::StateChangeStartup);
        assert_eq!(config.on_payload, Value::String("on".into()));
        assert_eq!(config.off_payload, Value::String("off".into()));
    }

    #[test]
    fn test_sunday_first_days_are_converted_once() {
        let config = parse(
            r#"
            [[events]]
            start = { dow = 0, mod = 1430 }
            end = { dow = 1, mod = 10 }
            "#,
        )
        .unwrap();
        // Sunday 23:50 to Monday 00:10
        assert_eq!(
            config.schedule.events(),
            &[ScheduledEvent::new(point(6, 23, 50), point(0, 0, 10))]
        );
    }

    #[test]
    fn test_out_of_range_event_fields() {
        let err = parse("[[events]]\nstart = { dow = 7, mod = 0 }\nend = { dow = 1, mod = 0 }\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::DayOfWeek { entry: 0, value: 7 }));

        let err = parse("[[events]]\nstart = { dow = 1, mod = 0 }\nend = { dow = 1, mod = 1440 }\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MinuteOfDay { entry: 0, value: 1440 }));

        let err = parse("[[events]]\nstart = { dow = -1, mod = 0 }\nend = { dow = 1, mod = 0 }\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::DayOfWeek { value: -1, .. }));
    }

    #[test]
    fn test_windows_expand_per_day() {
        let config = parse(
            r#"
            [[windows]]
            days = "weekend"
            on = "22:00"
            off = "01:30"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.schedule.events(),
            &[
                ScheduledEvent::new(point(5, 22, 0), point(6, 1, 30)),
                ScheduledEvent::new(point(6, 22, 0), point(0, 1, 30)),
            ]
        );
    }

    #[test]
    fn test_whole_week_window() {
        let config = parse("[[windows]]\nwhole_week = true\n").unwrap();
        assert_eq!(config.schedule.len(), 1);
        assert!(config.schedule.events()[0].is_whole_week());
    }

    #[test]
    fn test_window_errors() {
        assert!(matches!(
            parse("[[windows]]\ndays = \"someday\"\non = \"08:00\"\noff = \"09:00\"\n"),
            Err(ConfigError::Days { entry: 0, .. })
        ));
        assert!(matches!(
            parse("[[windows]]\non = \"8 o'clock\"\noff = \"09:00\"\n"),
            Err(ConfigError::ClockTime { .. })
        ));
        assert!(matches!(
            parse("[[windows]]\non = \"08:00\"\n"),
            Err(ConfigError::MissingTime { field: "off", .. })
        ));
        assert!(matches!(
            parse("[[windows]]\non = \"08:00\"\noff = \"08:00\"\n"),
            Err(ConfigError::EmptyWindow { entry: 0 })
        ));
    }

    #[test]
    fn test_invalid_coordinates() {
        let err = Config::from_toml_str("latitude = 91.0\nlongitude = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Coordinates { .. }));
        assert!(matches!(
            Config::from_toml_str("latitude = 0.0\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_threshold_must_be_finite() {
        assert!(matches!(
            parse("sun_elevation_threshold = nan\n"),
            Err(ConfigError::Threshold(_))
        ));
    }

    #[test]
    fn test_payloads_and_legacy_frequency_names() {
        let config = parse(
            r#"
            topic = "porch"
            output_frequency = "output.minutely"
            on_payload = { brightness = 80 }
            off_payload = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.topic, "porch");
        assert_eq!(config.output_frequency, OutputFrequency::EveryEvaluation);
        assert_eq!(config.on_payload, serde_json::json!({ "brightness": 80 }));
        assert_eq!(config.off_payload, serde_json::json!(0));
    }
}
