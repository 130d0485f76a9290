/*!
 # Inbound command grammar

 Commands arrive as free text. They are parsed once, here, into [`Command`];
 nothing past this point sees the raw string.
*/

use std::str::FromStr;
use thiserror::Error;
use tracing::trace;

use crate::mode::OverrideMode;

/// A recognised inbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch the override mode
    SetMode(OverrideMode),
    /// List the current-or-next occurrence of every window
    Info,
    /// Report the next schedule transition
    Next,
}

/// Input that matches none of the command forms
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Unrecognized command '{0}'")]
    Unrecognized(String),
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let command = match input.trim().to_lowercase().as_str() {
            "on" | "1" => Command::SetMode(OverrideMode::On),
            "off" | "0" => Command::SetMode(OverrideMode::Off),
            "auto" => Command::SetMode(OverrideMode::Auto),
            "stop" => Command::SetMode(OverrideMode::Stop),
            "schedule-only" => Command::SetMode(OverrideMode::ScheduleOnly),
            "light-only" => Command::SetMode(OverrideMode::LightOnly),
            "info" => Command::Info,
            "next" => Command::Next,
            _ => return Err(CommandParseError::Unrecognized(input.to_string())),
        };
        trace!("Parsed command {:?} from '{}'", command, input);
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_aliases() {
        for input in ["ON", "on", "1", " On \n"] {
            assert_eq!(
                input.parse::<Command>(),
                Ok(Command::SetMode(OverrideMode::On)),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn test_all_modes() {
        let cases = [
            ("0", OverrideMode::Off),
            ("OFF", OverrideMode::Off),
            ("Auto", OverrideMode::Auto),
            ("stop", OverrideMode::Stop),
            ("Schedule-Only", OverrideMode::ScheduleOnly),
            ("light-only", OverrideMode::LightOnly),
        ];
        for (input, mode) in cases {
            assert_eq!(input.parse::<Command>(), Ok(Command::SetMode(mode)));
            // Every mode name parses back to itself
            assert_eq!(mode.as_str().parse::<Command>(), Ok(Command::SetMode(mode)));
        }
    }

    #[test]
    fn test_queries() {
        assert_eq!("INFO".parse::<Command>(), Ok(Command::Info));
        assert_eq!("next".parse::<Command>(), Ok(Command::Next));
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(
            "xyz".parse::<Command>(),
            Err(CommandParseError::Unrecognized("xyz".to_string()))
        );
        assert!("schedule only".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }
}
