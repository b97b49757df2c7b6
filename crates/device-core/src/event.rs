//! Immutable event records and the topics they are published on

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Topics published by the runtime
pub mod topics {
    /// A device's on/off state changed (manager-level, carries old and new)
    pub const DEVICE_STATE_CHANGED: &str = "device_state_changed";
    /// A sensor raised its one-shot alarm
    pub const DEVICE_ALARM: &str = "device_alarm";
    /// A device's on/off state changed (device-level)
    pub const STATE_CHANGED: &str = "state_changed";
    /// A camera's motion flag flipped
    pub const MOTION_DETECTED: &str = "motion_detected";
}

/// An immutable record of something observable a device did.
///
/// Events are fire-and-forget: they are delivered synchronously to the
/// subscribers registered at publish time and never replayed.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub device_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event stamped with the current time
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Device-level state change (`state` is `"on"`, `"off"` or `"alarm"`)
    #[must_use]
    pub fn state_changed(device_id: &str, state: &str) -> Self {
        Self::new(device_id, topics::STATE_CHANGED, json!({ "state": state }))
    }

    /// A numeric attribute moved past its visibility threshold
    #[must_use]
    pub fn attribute_changed(device_id: &str, attribute: &str, old: f64, new: f64) -> Self {
        Self::new(
            device_id,
            format!("{attribute}_changed"),
            json!({ "attribute": attribute, "old": old, "new": new }),
        )
    }
}
