//! Simulated device state machines
//!
//! Each device kind has a closed capability set and a static table of
//! attribute bounds, resolved at construction time. All observable changes
//! go through `apply`, `tick` or `trigger_alarm`, which push events for the
//! caller to publish.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::DeviceError;
use crate::event::Event;
use crate::simulation::damped_step;
use crate::store::DeviceSnapshot;

/// Well-known attribute names
pub mod attr {
    pub const BRIGHTNESS: &str = "brightness";
    pub const POWER_DRAW: &str = "power_draw";
    pub const TARGET_TEMPERATURE: &str = "target_temperature";
    pub const TEMPERATURE: &str = "temperature";
    pub const RECORDING: &str = "recording";
    pub const MOTION_DETECTED: &str = "motion_detected";
    pub const TRIGGERED: &str = "triggered";
}

// Simulation tuning per kind: step bounds, noise amplitude, and the minimum
// visible delta below which no event is emitted.
const LIGHT_MAX_STEP: f64 = 5.0;
const LIGHT_NOISE: f64 = 1.5;
const LIGHT_MIN_DELTA: f64 = 1.0;
const THERMOSTAT_MAX_STEP: f64 = 0.5;
const THERMOSTAT_NOISE: f64 = 0.15;
const THERMOSTAT_MIN_DELTA: f64 = 0.1;

const LIGHT_WATTS_PER_PERCENT: f64 = 0.6;
const THERMOSTAT_DRAW_WATTS: f64 = 1200.0;

/// Device kinds supported by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Thermostat,
    Camera,
    SmokeSensor,
    WaterLeakSensor,
}

/// Parameterized commands a kind accepts beyond on/off/toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SetBrightness,
    SetTemperature,
    TriggerAlarm,
}

/// Declared bounds for a numeric attribute
#[derive(Debug, Clone, Copy)]
pub struct AttributeRange {
    pub attribute: &'static str,
    pub min: f64,
    pub max: f64,
}

impl DeviceKind {
    /// Commands this kind accepts beyond on/off/toggle
    #[must_use]
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Light => &[Capability::SetBrightness],
            Self::Thermostat => &[Capability::SetTemperature],
            Self::Camera => &[],
            Self::SmokeSensor | Self::WaterLeakSensor => &[Capability::TriggerAlarm],
        }
    }

    #[must_use]
    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Declared bounds for this kind's numeric attributes
    #[must_use]
    pub fn attribute_ranges(self) -> &'static [AttributeRange] {
        match self {
            Self::Light => &[
                AttributeRange {
                    attribute: attr::BRIGHTNESS,
                    min: 0.0,
                    max: 100.0,
                },
                AttributeRange {
                    attribute: attr::POWER_DRAW,
                    min: 0.0,
                    max: 2000.0,
                },
            ],
            Self::Thermostat => &[
                AttributeRange {
                    attribute: attr::TARGET_TEMPERATURE,
                    min: 15.0,
                    max: 30.0,
                },
                AttributeRange {
                    attribute: attr::TEMPERATURE,
                    min: 10.0,
                    max: 35.0,
                },
                AttributeRange {
                    attribute: attr::POWER_DRAW,
                    min: 0.0,
                    max: 2000.0,
                },
            ],
            Self::Camera | Self::SmokeSensor | Self::WaterLeakSensor => &[],
        }
    }

    #[must_use]
    pub fn attribute_range(self, attribute: &str) -> Option<AttributeRange> {
        self.attribute_ranges()
            .iter()
            .copied()
            .find(|range| range.attribute == attribute)
    }

    /// Whether this kind reports power draw (and must read zero when off)
    #[must_use]
    pub fn is_metered(self) -> bool {
        matches!(self, Self::Light | Self::Thermostat)
    }

    /// Alarm classification for sensor kinds
    #[must_use]
    pub fn alarm_label(self) -> Option<&'static str> {
        match self {
            Self::SmokeSensor => Some("fire"),
            Self::WaterLeakSensor => Some("water"),
            _ => None,
        }
    }

    fn default_attributes(self) -> HashMap<String, AttrValue> {
        let mut data = HashMap::new();
        match self {
            Self::Light => {
                data.insert(attr::BRIGHTNESS.to_string(), AttrValue::Float(100.0));
                data.insert(attr::POWER_DRAW.to_string(), AttrValue::Float(0.0));
            }
            Self::Thermostat => {
                data.insert(attr::TARGET_TEMPERATURE.to_string(), AttrValue::Float(22.0));
                data.insert(attr::TEMPERATURE.to_string(), AttrValue::Float(20.0));
                data.insert(attr::POWER_DRAW.to_string(), AttrValue::Float(0.0));
            }
            Self::Camera => {
                data.insert(attr::RECORDING.to_string(), AttrValue::Bool(false));
                data.insert(attr::MOTION_DETECTED.to_string(), AttrValue::Bool(false));
            }
            Self::SmokeSensor | Self::WaterLeakSensor => {
                data.insert(attr::TRIGGERED.to_string(), AttrValue::Bool(false));
            }
        }
        data
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => f.write_str("light"),
            Self::Thermostat => f.write_str("thermostat"),
            Self::Camera => f.write_str("camera"),
            Self::SmokeSensor => f.write_str("smoke_sensor"),
            Self::WaterLeakSensor => f.write_str("water_leak_sensor"),
        }
    }
}

/// On/off state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    On,
    Off,
}

impl DeviceState {
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

/// A single typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A simulated smart-home device
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    id: String,
    name: String,
    kind: DeviceKind,
    state: DeviceState,
    attributes: HashMap<String, AttrValue>,
    /// Where the light's brightness is currently drifting to
    #[serde(skip)]
    drift_target: Option<f64>,
}

impl Device {
    /// Create a device in the off state with its kind's default attributes
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            state: DeviceState::Off,
            attributes: kind.default_attributes(),
            drift_target: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, AttrValue> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Numeric attribute value, if present and numeric
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(AttrValue::as_f64)
    }

    /// Boolean attribute value, if present and boolean
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.attributes.get(name).and_then(AttrValue::as_bool)
    }

    /// Apply a command, pushing an event for every observable change.
    ///
    /// On/off/toggle always succeed and are idempotent. Parameterized
    /// commands are rejected with `UnsupportedCommand` when the kind does
    /// not declare them and `OutOfRange` when the value violates the
    /// attribute's bounds; a rejected command leaves the attribute
    /// untouched. The compound `on_and_*` forms commit the turn-on first,
    /// so a bad parameter leaves the device on.
    pub fn apply(
        &mut self,
        command: &Command,
        events: &mut Vec<Event>,
    ) -> Result<(), DeviceError> {
        match command {
            Command::TurnOn => {
                self.set_state(DeviceState::On, events);
                Ok(())
            }
            Command::TurnOff => {
                self.set_state(DeviceState::Off, events);
                Ok(())
            }
            Command::Toggle => {
                self.set_state(self.state.flipped(), events);
                Ok(())
            }
            Command::SetBrightness(level) => self.set_brightness(command, *level, events),
            Command::SetTemperature(value) => self.set_temperature(command, *value, events),
            Command::OnAndSetBrightness(level) => {
                self.require(Capability::SetBrightness, command)?;
                self.set_state(DeviceState::On, events);
                self.set_brightness(command, *level, events)
            }
            Command::OnAndSetTemperature(value) => {
                self.require(Capability::SetTemperature, command)?;
                self.set_state(DeviceState::On, events);
                self.set_temperature(command, *value, events)
            }
        }
    }

    /// One autonomous simulation step; a no-op unless the device is on.
    ///
    /// Attributes move toward their target by a bounded, damped step and
    /// are clamped into the declared range. An event is pushed only when
    /// the change is at least the kind's minimum visible delta.
    pub fn tick<R: Rng>(&mut self, rng: &mut R, events: &mut Vec<Event>) {
        if !self.state.is_on() {
            return;
        }
        match self.kind {
            DeviceKind::Light => self.drift_brightness(rng, events),
            DeviceKind::Thermostat => self.drift_temperature(rng, events),
            // Camera drift runs on its own timer; sensors have no drift.
            DeviceKind::Camera | DeviceKind::SmokeSensor | DeviceKind::WaterLeakSensor => {}
        }
    }

    /// One-shot alarm for sensor kinds.
    ///
    /// Fires only while the sensor is on and not already triggered;
    /// anything else is a no-op returning `false`.
    pub fn trigger_alarm(&mut self, events: &mut Vec<Event>) -> bool {
        if !self.kind.supports(Capability::TriggerAlarm) {
            return false;
        }
        if !self.state.is_on() || self.flag(attr::TRIGGERED) == Some(true) {
            return false;
        }
        self.attributes
            .insert(attr::TRIGGERED.to_string(), AttrValue::Bool(true));
        events.push(Event::state_changed(&self.id, "alarm"));
        true
    }

    /// Flip the camera's motion flag; a no-op unless the camera is on.
    pub fn record_motion(&mut self, detected: bool, events: &mut Vec<Event>) -> bool {
        if self.kind != DeviceKind::Camera || !self.state.is_on() {
            return false;
        }
        if self.flag(attr::MOTION_DETECTED) == Some(detected) {
            return false;
        }
        self.attributes
            .insert(attr::MOTION_DETECTED.to_string(), AttrValue::Bool(detected));
        events.push(Event::new(
            &self.id,
            crate::event::topics::MOTION_DETECTED,
            serde_json::json!({ "detected": detected }),
        ));
        true
    }

    /// Snapshot this device's persistent state
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            kind: self.kind,
            state: self.state,
            data: self.attributes.clone(),
        }
    }

    /// Replay a snapshot into this device.
    ///
    /// Only attributes the kind declares are restored; numeric values are
    /// clamped into their declared range. A snapshot for a different kind
    /// is ignored.
    pub fn restore(&mut self, snapshot: &DeviceSnapshot) {
        if snapshot.kind != self.kind {
            tracing::warn!(
                "Ignoring snapshot of kind {} for {} device {}",
                snapshot.kind,
                self.kind,
                self.id
            );
            return;
        }
        self.state = snapshot.state;
        for (name, value) in &snapshot.data {
            if !self.attributes.contains_key(name) {
                continue;
            }
            let value = match (value.as_f64(), self.kind.attribute_range(name)) {
                (Some(number), Some(range)) => {
                    AttrValue::Float(number.clamp(range.min, range.max))
                }
                _ => value.clone(),
            };
            self.attributes.insert(name.clone(), value);
        }
        self.apply_state_side_effects();
    }

    fn require(&self, capability: Capability, command: &Command) -> Result<(), DeviceError> {
        if self.kind.supports(capability) {
            Ok(())
        } else {
            Err(DeviceError::UnsupportedCommand {
                command: command.to_string(),
                kind: self.kind,
            })
        }
    }

    fn check_range(&self, attribute: &'static str, value: f64) -> Result<(), DeviceError> {
        if let Some(range) = self.kind.attribute_range(attribute) {
            if value < range.min || value > range.max {
                return Err(DeviceError::OutOfRange {
                    attribute,
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    fn set_state(&mut self, next: DeviceState, events: &mut Vec<Event>) {
        if self.state == next {
            return;
        }
        self.state = next;
        self.apply_state_side_effects();
        events.push(Event::state_changed(&self.id, &next.to_string()));
    }

    // Kind side effects tied to the on/off transition. Metered kinds must
    // read zero power draw while off.
    fn apply_state_side_effects(&mut self) {
        match (self.kind, self.state) {
            (DeviceKind::Light, _) => self.refresh_power_draw(),
            (DeviceKind::Thermostat, DeviceState::On) => {
                self.attributes.insert(
                    attr::POWER_DRAW.to_string(),
                    AttrValue::Float(THERMOSTAT_DRAW_WATTS),
                );
            }
            (DeviceKind::Thermostat, DeviceState::Off) => {
                self.attributes
                    .insert(attr::POWER_DRAW.to_string(), AttrValue::Float(0.0));
            }
            (DeviceKind::Camera, DeviceState::On) => {
                self.attributes
                    .insert(attr::RECORDING.to_string(), AttrValue::Bool(true));
            }
            (DeviceKind::Camera, DeviceState::Off) => {
                self.attributes
                    .insert(attr::RECORDING.to_string(), AttrValue::Bool(false));
                self.attributes
                    .insert(attr::MOTION_DETECTED.to_string(), AttrValue::Bool(false));
            }
            (DeviceKind::SmokeSensor | DeviceKind::WaterLeakSensor, DeviceState::Off) => {
                self.attributes
                    .insert(attr::TRIGGERED.to_string(), AttrValue::Bool(false));
            }
            (DeviceKind::SmokeSensor | DeviceKind::WaterLeakSensor, DeviceState::On) => {}
        }
    }

    fn refresh_power_draw(&mut self) {
        let draw = if self.state.is_on() {
            self.number(attr::BRIGHTNESS).unwrap_or(0.0) * LIGHT_WATTS_PER_PERCENT
        } else {
            0.0
        };
        self.attributes
            .insert(attr::POWER_DRAW.to_string(), AttrValue::Float(draw));
    }

    fn set_brightness(
        &mut self,
        command: &Command,
        level: f64,
        events: &mut Vec<Event>,
    ) -> Result<(), DeviceError> {
        self.require(Capability::SetBrightness, command)?;
        self.check_range(attr::BRIGHTNESS, level)?;

        let old = self.number(attr::BRIGHTNESS).unwrap_or(0.0);
        self.attributes
            .insert(attr::BRIGHTNESS.to_string(), AttrValue::Float(level));
        if (old - level).abs() > f64::EPSILON {
            events.push(Event::attribute_changed(&self.id, attr::BRIGHTNESS, old, level));
        }

        // Brightness drives the on/off state: anything above zero is on.
        let next = if level > 0.0 {
            DeviceState::On
        } else {
            DeviceState::Off
        };
        self.set_state(next, events);
        self.refresh_power_draw();
        Ok(())
    }

    fn set_temperature(
        &mut self,
        command: &Command,
        value: f64,
        events: &mut Vec<Event>,
    ) -> Result<(), DeviceError> {
        self.require(Capability::SetTemperature, command)?;
        self.check_range(attr::TARGET_TEMPERATURE, value)?;

        let old = self.number(attr::TARGET_TEMPERATURE).unwrap_or(0.0);
        self.attributes
            .insert(attr::TARGET_TEMPERATURE.to_string(), AttrValue::Float(value));
        if (old - value).abs() > f64::EPSILON {
            events.push(Event::attribute_changed(
                &self.id,
                attr::TARGET_TEMPERATURE,
                old,
                value,
            ));
        }
        Ok(())
    }

    fn drift_brightness<R: Rng>(&mut self, rng: &mut R, events: &mut Vec<Event>) {
        let old = self.number(attr::BRIGHTNESS).unwrap_or(0.0);

        // Re-pick the target once the current one has been reached.
        let target = match self.drift_target {
            Some(target) if (target - old).abs() > LIGHT_MIN_DELTA => target,
            _ => {
                let target = rng.gen_range(10.0..=100.0);
                self.drift_target = Some(target);
                target
            }
        };

        let noise = rng.gen_range(-LIGHT_NOISE..=LIGHT_NOISE);
        let next = damped_step(old, target, noise, LIGHT_MAX_STEP, 0.0, 100.0);
        self.attributes
            .insert(attr::BRIGHTNESS.to_string(), AttrValue::Float(next));
        self.refresh_power_draw();
        if (next - old).abs() >= LIGHT_MIN_DELTA {
            events.push(Event::attribute_changed(&self.id, attr::BRIGHTNESS, old, next));
        }
    }

    fn drift_temperature<R: Rng>(&mut self, rng: &mut R, events: &mut Vec<Event>) {
        let old = self.number(attr::TEMPERATURE).unwrap_or(0.0);
        let target = self.number(attr::TARGET_TEMPERATURE).unwrap_or(old);

        let range = self
            .kind
            .attribute_range(attr::TEMPERATURE)
            .unwrap_or(AttributeRange {
                attribute: attr::TEMPERATURE,
                min: f64::MIN,
                max: f64::MAX,
            });
        let noise = rng.gen_range(-THERMOSTAT_NOISE..=THERMOSTAT_NOISE);
        let next = damped_step(old, target, noise, THERMOSTAT_MAX_STEP, range.min, range.max);
        self.attributes
            .insert(attr::TEMPERATURE.to_string(), AttrValue::Float(next));
        if (next - old).abs() >= THERMOSTAT_MIN_DELTA {
            events.push(Event::attribute_changed(&self.id, attr::TEMPERATURE, old, next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn light() -> Device {
        Device::new("lamp", "Living Room Light", DeviceKind::Light)
    }

    fn thermostat() -> Device {
        Device::new("thermostat", "Thermostat", DeviceKind::Thermostat)
    }

    fn camera() -> Device {
        Device::new("camera", "Security Camera", DeviceKind::Camera)
    }

    fn smoke_sensor() -> Device {
        Device::new("smoke", "Smoke Sensor", DeviceKind::SmokeSensor)
    }

    fn apply(device: &mut Device, command: Command) -> (Result<(), DeviceError>, Vec<Event>) {
        let mut events = Vec::new();
        let result = device.apply(&command, &mut events);
        (result, events)
    }

    #[test]
    fn new_device_starts_off_with_defaults() {
        let device = light();
        assert_eq!(device.state(), DeviceState::Off);
        assert_eq!(device.number(attr::BRIGHTNESS), Some(100.0));
        assert_eq!(device.number(attr::POWER_DRAW), Some(0.0));
    }

    #[test]
    fn turn_on_emits_single_state_change() {
        let mut device = light();
        let (result, events) = apply(&mut device, Command::TurnOn);
        assert!(result.is_ok());
        assert_eq!(device.state(), DeviceState::On);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "state_changed");
        assert_eq!(events[0].payload["state"], "on");
    }

    #[test]
    fn turn_on_when_already_on_emits_nothing() {
        let mut device = light();
        apply(&mut device, Command::TurnOn);
        let (result, events) = apply(&mut device, Command::TurnOn);
        assert!(result.is_ok());
        assert!(events.is_empty());
    }

    #[test]
    fn toggle_twice_restores_state_with_two_events() {
        let mut device = light();
        let original = device.state();
        let (_, first) = apply(&mut device, Command::Toggle);
        let (_, second) = apply(&mut device, Command::Toggle);
        assert_eq!(device.state(), original);
        assert_eq!(first.len() + second.len(), 2);
    }

    #[test]
    fn metered_device_draws_no_power_when_off() {
        let mut device = light();
        apply(&mut device, Command::TurnOn);
        assert!(device.number(attr::POWER_DRAW).unwrap() > 0.0);
        apply(&mut device, Command::TurnOff);
        assert_eq!(device.number(attr::POWER_DRAW), Some(0.0));

        let mut device = thermostat();
        apply(&mut device, Command::TurnOn);
        assert!(device.number(attr::POWER_DRAW).unwrap() > 0.0);
        apply(&mut device, Command::TurnOff);
        assert_eq!(device.number(attr::POWER_DRAW), Some(0.0));
    }

    #[test]
    fn set_brightness_updates_value_and_state() {
        let mut device = light();
        let (result, events) = apply(&mut device, Command::SetBrightness(60.0));
        assert!(result.is_ok());
        assert_eq!(device.number(attr::BRIGHTNESS), Some(60.0));
        assert_eq!(device.state(), DeviceState::On);
        assert!(events.iter().any(|e| e.event_type == "brightness_changed"));
        assert!(events.iter().any(|e| e.event_type == "state_changed"));
    }

    #[test]
    fn zero_brightness_turns_the_light_off() {
        let mut device = light();
        apply(&mut device, Command::SetBrightness(60.0));
        let (result, _) = apply(&mut device, Command::SetBrightness(0.0));
        assert!(result.is_ok());
        assert_eq!(device.state(), DeviceState::Off);
        assert_eq!(device.number(attr::POWER_DRAW), Some(0.0));
    }

    #[test]
    fn out_of_range_brightness_is_rejected_untouched() {
        let mut device = light();
        for bad in [-1.0, 100.5, 1000.0] {
            let (result, events) = apply(&mut device, Command::SetBrightness(bad));
            assert!(matches!(result, Err(DeviceError::OutOfRange { .. })));
            assert!(events.is_empty());
            assert_eq!(device.number(attr::BRIGHTNESS), Some(100.0));
        }
    }

    #[test]
    fn out_of_range_temperature_is_rejected_untouched() {
        let mut device = thermostat();
        let (result, events) = apply(&mut device, Command::SetTemperature(31.0));
        assert!(matches!(result, Err(DeviceError::OutOfRange { .. })));
        assert!(events.is_empty());
        assert_eq!(device.number(attr::TARGET_TEMPERATURE), Some(22.0));
    }

    #[test]
    fn set_temperature_does_not_change_state() {
        let mut device = thermostat();
        let (result, events) = apply(&mut device, Command::SetTemperature(25.5));
        assert!(result.is_ok());
        assert_eq!(device.state(), DeviceState::Off);
        assert_eq!(device.number(attr::TARGET_TEMPERATURE), Some(25.5));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "target_temperature_changed");
    }

    #[test]
    fn unsupported_command_leaves_device_untouched() {
        let mut device = light();
        let (result, events) = apply(&mut device, Command::SetTemperature(20.0));
        assert!(matches!(
            result,
            Err(DeviceError::UnsupportedCommand { .. })
        ));
        assert!(events.is_empty());
        assert_eq!(device.state(), DeviceState::Off);
    }

    #[test]
    fn compound_command_turns_on_then_sets() {
        let mut device = thermostat();
        let (result, events) = apply(&mut device, Command::OnAndSetTemperature(19.0));
        assert!(result.is_ok());
        assert_eq!(device.state(), DeviceState::On);
        assert_eq!(device.number(attr::TARGET_TEMPERATURE), Some(19.0));
        assert_eq!(events[0].event_type, "state_changed");
    }

    #[test]
    fn compound_command_with_bad_value_still_turns_on() {
        let mut device = thermostat();
        let (result, events) = apply(&mut device, Command::OnAndSetTemperature(50.0));
        assert!(matches!(result, Err(DeviceError::OutOfRange { .. })));
        assert_eq!(device.state(), DeviceState::On);
        assert_eq!(device.number(attr::TARGET_TEMPERATURE), Some(22.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "state_changed");
    }

    #[test]
    fn compound_command_on_wrong_kind_does_not_turn_on() {
        let mut device = camera();
        let (result, events) = apply(&mut device, Command::OnAndSetBrightness(50.0));
        assert!(matches!(
            result,
            Err(DeviceError::UnsupportedCommand { .. })
        ));
        assert!(events.is_empty());
        assert_eq!(device.state(), DeviceState::Off);
    }

    #[test]
    fn camera_records_while_on_and_clears_motion_when_off() {
        let mut device = camera();
        apply(&mut device, Command::TurnOn);
        assert_eq!(device.flag(attr::RECORDING), Some(true));

        let mut events = Vec::new();
        assert!(device.record_motion(true, &mut events));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "motion_detected");

        apply(&mut device, Command::TurnOff);
        assert_eq!(device.flag(attr::RECORDING), Some(false));
        assert_eq!(device.flag(attr::MOTION_DETECTED), Some(false));
    }

    #[test]
    fn motion_is_ignored_while_camera_is_off() {
        let mut device = camera();
        let mut events = Vec::new();
        assert!(!device.record_motion(true, &mut events));
        assert!(events.is_empty());
    }

    #[test]
    fn alarm_fires_once_while_armed() {
        let mut device = smoke_sensor();
        let mut events = Vec::new();

        // Not armed yet.
        assert!(!device.trigger_alarm(&mut events));

        apply(&mut device, Command::TurnOn);
        assert!(device.trigger_alarm(&mut events));
        assert_eq!(device.flag(attr::TRIGGERED), Some(true));
        let alarm = events.last().unwrap();
        assert_eq!(alarm.event_type, "state_changed");
        assert_eq!(alarm.payload["state"], "alarm");

        // Already triggered: no-op.
        let before = events.len();
        assert!(!device.trigger_alarm(&mut events));
        assert_eq!(events.len(), before);
    }

    #[test]
    fn turning_a_sensor_off_disarms_it() {
        let mut device = smoke_sensor();
        apply(&mut device, Command::TurnOn);
        let mut events = Vec::new();
        device.trigger_alarm(&mut events);
        apply(&mut device, Command::TurnOff);
        assert_eq!(device.flag(attr::TRIGGERED), Some(false));
    }

    #[test]
    fn tick_is_a_no_op_while_off() {
        let mut device = thermostat();
        let mut rng = StdRng::seed_from_u64(7);
        let mut events = Vec::new();
        device.tick(&mut rng, &mut events);
        assert!(events.is_empty());
        assert_eq!(device.number(attr::TEMPERATURE), Some(20.0));
    }

    #[test]
    fn temperature_drifts_toward_setpoint_within_range() {
        let mut device = thermostat();
        let mut rng = StdRng::seed_from_u64(7);
        let mut events = Vec::new();
        apply(&mut device, Command::OnAndSetTemperature(28.0));

        let start_gap = (device.number(attr::TEMPERATURE).unwrap() - 28.0).abs();
        for _ in 0..200 {
            device.tick(&mut rng, &mut events);
            let value = device.number(attr::TEMPERATURE).unwrap();
            assert!((10.0..=35.0).contains(&value));
        }
        let end_gap = (device.number(attr::TEMPERATURE).unwrap() - 28.0).abs();
        assert!(end_gap < start_gap);
        assert!(!events.is_empty());
    }

    #[test]
    fn tick_suppresses_sub_threshold_changes() {
        let mut device = thermostat();
        let mut rng = StdRng::seed_from_u64(11);
        apply(&mut device, Command::TurnOn);

        // Converge onto the setpoint, then sub-threshold jitter should
        // stop producing events entirely.
        let mut events = Vec::new();
        for _ in 0..500 {
            device.tick(&mut rng, &mut events);
        }
        events.clear();
        for _ in 0..20 {
            device.tick(&mut rng, &mut events);
        }
        let temperature = device.number(attr::TEMPERATURE).unwrap();
        assert!((temperature - 22.0).abs() < 1.0);
        assert!(events.len() < 20);
    }

    #[test]
    fn brightness_drift_stays_in_range_and_throttles_events() {
        let mut device = light();
        let mut rng = StdRng::seed_from_u64(3);
        let mut events = Vec::new();
        apply(&mut device, Command::TurnOn);

        for _ in 0..300 {
            device.tick(&mut rng, &mut events);
            let value = device.number(attr::BRIGHTNESS).unwrap();
            assert!((0.0..=100.0).contains(&value));
        }
        for event in &events {
            assert_eq!(event.event_type, "brightness_changed");
            let old = event.payload["old"].as_f64().unwrap();
            let new = event.payload["new"].as_f64().unwrap();
            assert!((new - old).abs() >= 1.0);
        }
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut device = thermostat();
        apply(&mut device, Command::OnAndSetTemperature(26.0));
        let snapshot = device.snapshot();

        let mut replica = thermostat();
        replica.restore(&snapshot);
        assert_eq!(replica.state(), DeviceState::On);
        assert_eq!(replica.number(attr::TARGET_TEMPERATURE), Some(26.0));
    }

    #[test]
    fn restore_clamps_out_of_range_values() {
        let mut snapshot = thermostat().snapshot();
        snapshot
            .data
            .insert(attr::TARGET_TEMPERATURE.to_string(), AttrValue::Float(99.0));

        let mut device = thermostat();
        device.restore(&snapshot);
        assert_eq!(device.number(attr::TARGET_TEMPERATURE), Some(30.0));
    }

    #[test]
    fn restore_ignores_undeclared_attributes_and_wrong_kind() {
        let mut snapshot = thermostat().snapshot();
        snapshot
            .data
            .insert("mystery".to_string(), AttrValue::Float(1.0));

        let mut device = thermostat();
        device.restore(&snapshot);
        assert!(device.attribute("mystery").is_none());

        let light_snapshot = light().snapshot();
        let before = device.snapshot();
        device.restore(&light_snapshot);
        assert_eq!(device.snapshot(), before);
    }
}
