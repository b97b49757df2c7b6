//! Time-of-day automation for hacienda
//!
//! Stores schedule tasks in a `"HH:MM"`-indexed table, persists them as
//! JSON, and replays due tasks as device commands from a background poller.

pub mod error;
pub mod model;
pub mod persistence;
pub mod service;

pub use error::ScheduleError;
pub use model::{ScheduleTask, TaskView, UpdateTaskRequest};
pub use service::ScheduleService;
