//! Error types for the schedule engine

use thiserror::Error;

use device_core::CommandParseError;

/// Errors that can occur in the schedule engine
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Time is not a valid `HH:MM` between 00:00 and 23:59
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Action string does not parse as a device command
    #[error("Invalid action: {0}")]
    InvalidAction(#[from] CommandParseError),

    /// Weekday outside 0..=6
    #[error("Invalid weekday: {0}")]
    InvalidWeekday(u8),

    /// No task at the given time slot and index
    #[error("No task at {time}[{index}]")]
    TaskNotFound { time: String, index: usize },

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
