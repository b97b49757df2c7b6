//! Crash-safe snapshot persistence using JSON file storage

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::device::{AttrValue, DeviceKind, DeviceState};

/// Persisted state of a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub state: DeviceState,
    pub data: HashMap<String, AttrValue>,
}

/// Full snapshot of the device registry, keyed by device id
pub type Snapshot = HashMap<String, DeviceSnapshot>;

/// Atomic JSON snapshot store.
///
/// Saves write to a temporary file and rename over the target, so a crash
/// mid-write leaves the previous snapshot intact. Loading never fails:
/// an absent, empty or corrupt file is an empty snapshot.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot from disk
    pub async fn load(&self) -> Snapshot {
        match fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => {
                tracing::debug!("Snapshot file {:?} is empty, starting fresh", self.path);
                Snapshot::new()
            }
            Ok(contents) => match serde_json::from_str::<Snapshot>(&contents) {
                Ok(snapshot) => {
                    tracing::info!(
                        "Loaded snapshot of {} devices from {:?}",
                        snapshot.len(),
                        self.path
                    );
                    snapshot
                }
                Err(e) => {
                    tracing::warn!("Failed to parse snapshot file {:?}: {}", self.path, e);
                    Snapshot::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No snapshot file found at {:?}, starting fresh", self.path);
                Snapshot::new()
            }
            Err(e) => {
                tracing::warn!("Failed to read snapshot file {:?}: {}", self.path, e);
                Snapshot::new()
            }
        }
    }

    /// Save the snapshot to disk atomically
    #[allow(clippy::missing_errors_doc)]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), std::io::Error> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Write atomically: write to temp file, then rename
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).await?;
        fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(
            "Saved snapshot of {} devices to {:?}",
            snapshot.len(),
            self.path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::attr;

    fn sample_snapshot() -> Snapshot {
        let mut data = HashMap::new();
        data.insert(attr::BRIGHTNESS.to_string(), AttrValue::Float(75.0));
        data.insert(attr::POWER_DRAW.to_string(), AttrValue::Float(45.0));

        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "lamp".to_string(),
            DeviceSnapshot {
                kind: DeviceKind::Light,
                state: DeviceState::On,
                data,
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("devices.json"));

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await, snapshot);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("devices.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        tokio::fs::write(&path, "{ not json ]").await.unwrap();

        let store = StateStore::new(path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn empty_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        tokio::fs::write(&path, "").await.unwrap();

        let store = StateStore::new(path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/data/devices.json"));
        store.save(&sample_snapshot()).await.unwrap();
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_uses_wire_field_names() {
        let json = serde_json::to_value(sample_snapshot()).unwrap();
        let lamp = &json["lamp"];
        assert_eq!(lamp["type"], "light");
        assert_eq!(lamp["state"], "on");
        assert_eq!(lamp["data"][attr::BRIGHTNESS], 75.0);
    }
}
