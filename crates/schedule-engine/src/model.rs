//! Data models for the schedule engine
//!
//! The on-disk schedule is a map from `"HH:MM"` to the tasks registered at
//! that time of day. Weekdays are numbered 0 = Monday through 6 = Sunday.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Timestamp format for the `added` field
const ADDED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single automation rule stored in the schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTask {
    /// Target device
    pub device_id: String,
    /// Wire-form command (`"on"`, `"set_temperature:22.5"`, …)
    pub action: String,
    /// Whether the task currently fires
    pub enabled: bool,
    /// Weekdays the task fires on (0 = Monday); empty never fires
    #[serde(default = "all_days")]
    pub days: Vec<u8>,
    /// Creation timestamp
    #[serde(default)]
    pub added: String,
}

/// Every day of the week
#[must_use]
pub fn all_days() -> Vec<u8> {
    vec![0, 1, 2, 3, 4, 5, 6]
}

impl ScheduleTask {
    /// Create a task stamped with the current local time
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        action: impl Into<String>,
        days: Vec<u8>,
        enabled: bool,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            action: action.into(),
            enabled,
            days,
            added: chrono::Local::now().format(ADDED_FORMAT).to_string(),
        }
    }

    /// Apply a partial update, preserving the original `added` stamp
    pub fn apply_update(&mut self, update: &UpdateTaskRequest) {
        if let Some(device_id) = &update.device_id {
            self.device_id = device_id.clone();
        }
        if let Some(action) = &update.action {
            self.action = action.clone();
        }
        if let Some(days) = &update.days {
            self.days = days.clone();
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
    }
}

/// The full schedule, keyed by `"HH:MM"`
pub type ScheduleTable = HashMap<String, Vec<ScheduleTask>>;

/// Partial update for an existing task; `None` fields keep the old value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    /// Move the task to a different time slot
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub days: Option<Vec<u8>>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Flattened task listing entry, addressed by `(time, index)`
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub time: String,
    pub index: usize,
    pub device_id: String,
    pub action: String,
    pub enabled: bool,
    pub days: Vec<u8>,
    pub added: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_defaults() {
        let task = ScheduleTask::new("lamp", "on", all_days(), true);
        assert_eq!(task.days.len(), 7);
        assert!(task.enabled);
        assert!(!task.added.is_empty());
    }

    #[test]
    fn update_preserves_added_stamp() {
        let mut task = ScheduleTask::new("lamp", "on", all_days(), true);
        let added = task.added.clone();

        task.apply_update(&UpdateTaskRequest {
            action: Some("off".to_string()),
            enabled: Some(false),
            ..UpdateTaskRequest::default()
        });

        assert_eq!(task.action, "off");
        assert!(!task.enabled);
        assert_eq!(task.device_id, "lamp");
        assert_eq!(task.added, added);
    }

    #[test]
    fn task_deserializes_wire_format() {
        let json = r#"{
            "device_id": "thermostat",
            "action": "on_and_set_temperature:21",
            "enabled": true,
            "days": [0, 1, 2, 3, 4],
            "added": "2024-03-01 07:00:00"
        }"#;
        let task: ScheduleTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.device_id, "thermostat");
        assert_eq!(task.days, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn missing_days_defaults_to_every_day() {
        let json = r#"{ "device_id": "lamp", "action": "on", "enabled": true }"#;
        let task: ScheduleTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.days, all_days());
    }
}
