//! Structured device command protocol
//!
//! Commands arrive from the outside world (console, schedule file) in the
//! conventional wire form `"<action>"` or `"<action>:<value>"` and are parsed
//! into a closed tagged union before they reach any device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A command accepted by the device runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum Command {
    /// Turn device on
    #[serde(rename = "on")]
    TurnOn,
    /// Turn device off
    #[serde(rename = "off")]
    TurnOff,
    /// Toggle device state
    Toggle,
    /// Set the thermostat setpoint
    SetTemperature(f64),
    /// Set the light brightness (percent)
    SetBrightness(f64),
    /// Turn on, then set the thermostat setpoint
    OnAndSetTemperature(f64),
    /// Turn on, then set the light brightness
    OnAndSetBrightness(f64),
}

/// Errors parsing the `"<action>:<value>"` wire form
#[derive(Error, Debug, PartialEq)]
pub enum CommandParseError {
    /// Action name is not part of the protocol
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Parameterized action came without a value
    #[error("Action '{0}' requires a value")]
    MissingValue(String),

    /// Bare action came with a value attached
    #[error("Action '{0}' does not take a value")]
    UnexpectedValue(String),

    /// Value is not a number
    #[error("Invalid value '{value}' for action '{action}'")]
    InvalidValue { action: String, value: String },
}

impl Command {
    /// Wire name of the base action
    #[must_use]
    pub fn base_action(&self) -> &'static str {
        match self {
            Self::TurnOn => "on",
            Self::TurnOff => "off",
            Self::Toggle => "toggle",
            Self::SetTemperature(_) => "set_temperature",
            Self::SetBrightness(_) => "set_brightness",
            Self::OnAndSetTemperature(_) => "on_and_set_temperature",
            Self::OnAndSetBrightness(_) => "on_and_set_brightness",
        }
    }

    /// Parameter carried by the command, if any
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::TurnOn | Self::TurnOff | Self::Toggle => None,
            Self::SetTemperature(v)
            | Self::SetBrightness(v)
            | Self::OnAndSetTemperature(v)
            | Self::OnAndSetBrightness(v) => Some(*v),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(value) => write!(f, "{}:{}", self.base_action(), value),
            None => f.write_str(self.base_action()),
        }
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, value) = match s.split_once(':') {
            Some((action, value)) => (action.trim(), Some(value.trim())),
            None => (s.trim(), None),
        };

        match (action, value) {
            ("on", None) => Ok(Self::TurnOn),
            ("off", None) => Ok(Self::TurnOff),
            ("toggle", None) => Ok(Self::Toggle),
            ("on" | "off" | "toggle", Some(_)) => {
                Err(CommandParseError::UnexpectedValue(action.to_string()))
            }
            (
                "set_temperature" | "set_brightness" | "on_and_set_temperature"
                | "on_and_set_brightness",
                None,
            ) => Err(CommandParseError::MissingValue(action.to_string())),
            (
                base @ ("set_temperature" | "set_brightness" | "on_and_set_temperature"
                | "on_and_set_brightness"),
                Some(raw),
            ) => {
                let value: f64 = raw.parse().map_err(|_| CommandParseError::InvalidValue {
                    action: base.to_string(),
                    value: raw.to_string(),
                })?;
                Ok(match base {
                    "set_temperature" => Self::SetTemperature(value),
                    "set_brightness" => Self::SetBrightness(value),
                    "on_and_set_temperature" => Self::OnAndSetTemperature(value),
                    _ => Self::OnAndSetBrightness(value),
                })
            }
            _ => Err(CommandParseError::UnknownAction(s.trim().to_string())),
        }
    }
}
