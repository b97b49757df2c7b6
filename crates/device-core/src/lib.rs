//! Simulated smart-home device runtime
//!
//! This crate provides the device state machines, the in-process event bus,
//! the device manager with crash-safe snapshots, and the autonomous
//! simulation that drifts device attributes while they are powered on.

pub mod command;
pub mod device;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod manager;
pub mod store;

mod simulation;

pub use command::{Command, CommandParseError};
pub use device::{attr, AttrValue, Capability, Device, DeviceKind, DeviceState};
pub use error::DeviceError;
pub use event::{topics, Event};
pub use event_bus::EventBus;
pub use manager::{DeviceManager, StateHistoryEntry};
pub use store::{DeviceSnapshot, Snapshot, StateStore};
