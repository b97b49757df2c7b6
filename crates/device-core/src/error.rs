//! Error types for the device runtime

use thiserror::Error;

use crate::device::DeviceKind;

/// Errors produced while routing or applying device commands
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Device id is not registered
    #[error("Device not found: {0}")]
    UnknownDevice(String),

    /// Command is not in the device's capability set
    #[error("Unsupported command '{command}' for {kind} device")]
    UnsupportedCommand { command: String, kind: DeviceKind },

    /// Parameter violates the attribute's declared bounds
    #[error("Value {value} for '{attribute}' is outside [{min}, {max}]")]
    OutOfRange {
        attribute: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}
