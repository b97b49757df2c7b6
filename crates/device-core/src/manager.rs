//! Device registry, command routing, and the periodic simulation drive

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::command::Command;
use crate::device::{Device, DeviceKind, DeviceState};
use crate::event::{topics, Event};
use crate::event_bus::EventBus;
use crate::simulation::{spawn_motion_worker, SimWorker};
use crate::store::{Snapshot, StateStore};

/// Bounded per-device state history length
const HISTORY_CAP: usize = 100;

/// One recorded state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateHistoryEntry {
    pub state: DeviceState,
    pub timestamp: DateTime<Utc>,
}

/// Owns the device registry and routes every mutation through a single
/// coarse lock, so two concurrent commands on the same device can neither
/// lose an update nor emit a duplicate event.
///
/// The manager is the only writer of the [`StateStore`]: the full registry
/// snapshot is rewritten after every committed transition.
pub struct DeviceManager {
    devices: Arc<DashMap<String, Device>>,
    history: DashMap<String, VecDeque<StateHistoryEntry>>,
    /// Last state observed per device, for the reconciliation pass
    last_states: DashMap<String, DeviceState>,
    sim_workers: DashMap<String, SimWorker>,
    bus: Arc<EventBus>,
    store: StateStore,
    command_lock: Arc<Mutex<()>>,
}

impl DeviceManager {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, store: StateStore) -> Self {
        Self {
            devices: Arc::new(DashMap::new()),
            history: DashMap::new(),
            last_states: DashMap::new(),
            sim_workers: DashMap::new(),
            bus,
            store,
            command_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Register a device
    pub fn add_device(&self, device: Device) {
        tracing::info!("Added device: {} ({})", device.name(), device.id());
        self.last_states
            .insert(device.id().to_string(), device.state());
        self.devices.insert(device.id().to_string(), device);
    }

    /// Get a copy of a device by id
    #[must_use]
    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).map(|entry| entry.value().clone())
    }

    /// Get copies of all registered devices
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.devices.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Recorded state transitions for a device, oldest first
    #[must_use]
    pub fn history(&self, device_id: &str) -> Vec<StateHistoryEntry> {
        self.history
            .get(device_id)
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Route a command to a device.
    ///
    /// Unknown devices fail silently with `false`. On a committed state
    /// flip the manager appends a history entry, rewrites the snapshot,
    /// publishes the device's own events, and publishes
    /// `device_state_changed` with the old and new state. A compound
    /// command whose parameter is rejected still commits and publishes the
    /// turn-on before reporting `false`.
    pub async fn send_command(&self, device_id: &str, command: &Command) -> bool {
        let guard = self.command_lock.lock().await;

        let Some(mut device) = self.devices.get_mut(device_id) else {
            drop(guard);
            tracing::warn!("Command '{}' for unknown device {}", command, device_id);
            return false;
        };

        let old_state = device.state();
        let mut events = Vec::new();
        let result = device.apply(command, &mut events);
        let new_state = device.state();
        let kind = device.kind();
        drop(device);

        if let Err(ref e) = result {
            tracing::warn!("Command '{}' rejected by {}: {}", command, device_id, e);
        } else {
            tracing::info!("Command '{}' applied to {}", command, device_id);
        }

        let state_changed = old_state != new_state;
        if state_changed {
            self.push_history(device_id, new_state);
            self.last_states.insert(device_id.to_string(), new_state);
        }

        if !events.is_empty() {
            self.persist().await;
        }

        for event in &events {
            self.bus.publish(&event.event_type, event);
        }
        if state_changed {
            self.publish_state_changed(device_id, old_state, new_state);
        }
        drop(guard);

        if state_changed {
            self.update_worker(device_id, kind, new_state).await;
        }

        result.is_ok()
    }

    /// Fire a sensor's one-shot alarm.
    ///
    /// On firing, persists the triggered flag, publishes the device's
    /// `state_changed` (payload `alarm`), and publishes `device_alarm` —
    /// the hook external alerting subscribes to.
    pub async fn trigger_alarm(&self, device_id: &str) -> bool {
        let guard = self.command_lock.lock().await;

        let Some(mut device) = self.devices.get_mut(device_id) else {
            drop(guard);
            tracing::warn!("Alarm trigger for unknown device {}", device_id);
            return false;
        };

        let mut events = Vec::new();
        let fired = device.trigger_alarm(&mut events);
        let name = device.name().to_string();
        let kind = device.kind();
        drop(device);

        if fired {
            tracing::warn!("Alarm triggered by {}", device_id);
            self.persist().await;
            for event in &events {
                self.bus.publish(&event.event_type, event);
            }
            if let Some(label) = kind.alarm_label() {
                let alarm = Event::new(
                    device_id,
                    topics::DEVICE_ALARM,
                    json!({
                        "type": label,
                        "message": format!("{name} raised a {label} alarm"),
                    }),
                );
                self.bus.publish(topics::DEVICE_ALARM, &alarm);
            }
        }
        drop(guard);

        fired
    }

    /// Advance every powered-on device's simulation by one step, then
    /// reconcile externally-made state changes into history and the
    /// snapshot. Invoked by an external periodic driver.
    pub async fn tick_all(&self) {
        let guard = self.command_lock.lock().await;

        let mut events = Vec::new();
        {
            let mut rng = rand::thread_rng();
            for mut entry in self.devices.iter_mut() {
                entry.value_mut().tick(&mut rng, &mut events);
            }
        }

        // Reconciliation pass: catch state flips that did not come through
        // send_command.
        let mut reconciled: Vec<(String, DeviceState, DeviceState)> = Vec::new();
        for entry in self.devices.iter() {
            let current = entry.value().state();
            let last = self.last_states.get(entry.key()).map(|state| *state);
            if last != Some(current) {
                reconciled.push((entry.key().clone(), last.unwrap_or(current), current));
            }
        }
        for (device_id, _, new_state) in &reconciled {
            tracing::info!("Reconciled external state change on {}", device_id);
            self.push_history(device_id, *new_state);
            self.last_states.insert(device_id.clone(), *new_state);
        }

        if !reconciled.is_empty() {
            self.persist().await;
        }

        for event in &events {
            self.bus.publish(&event.event_type, event);
        }
        for (device_id, old_state, new_state) in &reconciled {
            self.publish_state_changed(device_id, *old_state, *new_state);
        }
        drop(guard);
    }

    /// Load the snapshot and replay it into registered devices.
    ///
    /// Snapshot entries for unknown device ids are ignored. Devices
    /// restored to the on state get their simulation workers back.
    pub async fn restore(&self) {
        let snapshot = self.store.load().await;

        let guard = self.command_lock.lock().await;
        for (device_id, device_snapshot) in &snapshot {
            let Some(mut device) = self.devices.get_mut(device_id) else {
                tracing::debug!("Ignoring snapshot entry for unknown device {}", device_id);
                continue;
            };
            device.restore(device_snapshot);
            let state = device.state();
            drop(device);
            self.last_states.insert(device_id.clone(), state);
        }
        drop(guard);

        let restored: Vec<(String, DeviceKind, DeviceState)> = self
            .devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().kind(), entry.value().state()))
            .collect();
        for (device_id, kind, state) in restored {
            self.update_worker(&device_id, kind, state).await;
        }
    }

    /// Stop every per-device simulation worker
    pub async fn shutdown(&self) {
        let device_ids: Vec<String> = self
            .sim_workers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for device_id in device_ids {
            if let Some((_, worker)) = self.sim_workers.remove(&device_id) {
                worker.stop().await;
            }
        }
    }

    fn publish_state_changed(&self, device_id: &str, old_state: DeviceState, new_state: DeviceState) {
        let event = Event::new(
            device_id,
            topics::DEVICE_STATE_CHANGED,
            json!({
                "device_id": device_id,
                "old_state": old_state,
                "new_state": new_state,
            }),
        );
        self.bus.publish(topics::DEVICE_STATE_CHANGED, &event);
    }

    fn push_history(&self, device_id: &str, state: DeviceState) {
        let mut entries = self.history.entry(device_id.to_string()).or_default();
        if entries.len() == HISTORY_CAP {
            entries.pop_front();
        }
        entries.push_back(StateHistoryEntry {
            state,
            timestamp: Utc::now(),
        });
    }

    async fn persist(&self) {
        let snapshot: Snapshot = self
            .devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        if let Err(e) = self.store.save(&snapshot).await {
            tracing::warn!("Failed to save device snapshot: {}", e);
        }
    }

    /// Start or stop the device's private simulation worker to match its
    /// state. Stopping waits until the worker has fully exited.
    async fn update_worker(&self, device_id: &str, kind: DeviceKind, state: DeviceState) {
        if kind != DeviceKind::Camera {
            return;
        }
        match state {
            DeviceState::On => {
                if !self.sim_workers.contains_key(device_id) {
                    let worker = spawn_motion_worker(
                        device_id.to_string(),
                        Arc::clone(&self.devices),
                        Arc::clone(&self.command_lock),
                        Arc::clone(&self.bus),
                    );
                    self.sim_workers.insert(device_id.to_string(), worker);
                }
            }
            DeviceState::Off => {
                if let Some((_, worker)) = self.sim_workers.remove(device_id) {
                    worker.stop().await;
                }
            }
        }
    }
}
