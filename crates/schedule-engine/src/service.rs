//! Schedule service: the task table, its validation, and the poller that
//! replays due tasks as device commands

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveTime, Timelike};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use device_core::{Command, DeviceManager};

use crate::error::ScheduleError;
use crate::model::{all_days, ScheduleTable, ScheduleTask, TaskView, UpdateTaskRequest};
use crate::persistence;

/// Poller cadence; matching granularity is one minute
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Owns the time-indexed task table and the background poller.
///
/// Every mutation validates its input and rewrites the schedule file. The
/// poller fires each enabled, weekday-matching task at most once per
/// matching minute — best effort, with no catch-up for minutes missed
/// while the process was stalled.
pub struct ScheduleService {
    tasks: DashMap<String, Vec<ScheduleTask>>,
    data_path: PathBuf,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleService {
    /// Create a service backed by `<data_dir>/schedule.json`, loading any
    /// persisted tasks. A corrupt or missing file is an empty schedule.
    pub async fn new(data_dir: &Path) -> Self {
        let data_path = data_dir.join("schedule.json");
        let table = persistence::load_schedule(&data_path).await;

        let tasks = DashMap::new();
        for (time, bucket) in table {
            tasks.insert(time, bucket);
        }

        Self {
            tasks,
            data_path,
            poller: Mutex::new(None),
        }
    }

    /// Add a task at the given time of day.
    ///
    /// The time is validated and canonicalized to `HH:MM` (so `"7:05"` is
    /// stored as `"07:05"`), the action must parse as a command, and
    /// `days` defaults to every day of the week.
    pub async fn add_task(
        &self,
        time: &str,
        device_id: impl Into<String>,
        action: impl Into<String>,
        days: Option<Vec<u8>>,
        enabled: bool,
    ) -> Result<ScheduleTask, ScheduleError> {
        let time = validate_time(time)?;
        let action = action.into();
        action.parse::<Command>()?;
        let days = match days {
            Some(days) => {
                validate_days(&days)?;
                days
            }
            None => all_days(),
        };

        let task = ScheduleTask::new(device_id, action, days, enabled);
        self.tasks.entry(time.clone()).or_default().push(task.clone());
        self.save().await?;

        tracing::info!(
            "Scheduled '{}' for {} at {} (days: {:?})",
            task.action,
            task.device_id,
            time,
            task.days
        );
        Ok(task)
    }

    /// Update the task at `(time, index)`.
    ///
    /// Moving it to a new time re-slots it at the end of the target
    /// bucket; its `added` stamp is preserved and emptied buckets are
    /// dropped.
    pub async fn update_task(
        &self,
        time: &str,
        index: usize,
        update: UpdateTaskRequest,
    ) -> Result<(), ScheduleError> {
        let new_time = match &update.time {
            Some(new_time) => Some(validate_time(new_time)?),
            None => None,
        };
        if let Some(action) = &update.action {
            action.parse::<Command>()?;
        }
        if let Some(days) = &update.days {
            validate_days(days)?;
        }

        let task = {
            let mut bucket = self.tasks.get_mut(time).ok_or_else(|| not_found(time, index))?;
            let task = bucket.get_mut(index).ok_or_else(|| not_found(time, index))?;
            task.apply_update(&update);
            task.clone()
        };

        if let Some(new_time) = new_time.filter(|new_time| new_time.as_str() != time) {
            {
                let mut bucket = self.tasks.get_mut(time).ok_or_else(|| not_found(time, index))?;
                bucket.remove(index);
            }
            self.tasks.remove_if(time, |_, bucket| bucket.is_empty());
            self.tasks.entry(new_time).or_default().push(task);
        }

        self.save().await?;
        Ok(())
    }

    /// Remove the task at `(time, index)`, or every task at `time`
    pub async fn remove_task(
        &self,
        time: &str,
        index: Option<usize>,
    ) -> Result<(), ScheduleError> {
        match index {
            Some(index) => {
                {
                    let mut bucket =
                        self.tasks.get_mut(time).ok_or_else(|| not_found(time, index))?;
                    if index >= bucket.len() {
                        return Err(not_found(time, index));
                    }
                    bucket.remove(index);
                }
                self.tasks.remove_if(time, |_, bucket| bucket.is_empty());
            }
            None => {
                self.tasks
                    .remove(time)
                    .ok_or_else(|| not_found(time, 0))?;
            }
        }
        self.save().await?;
        Ok(())
    }

    /// Enable or disable the task at `(time, index)`
    pub async fn toggle_task(
        &self,
        time: &str,
        index: usize,
        enabled: bool,
    ) -> Result<(), ScheduleError> {
        {
            let mut bucket = self.tasks.get_mut(time).ok_or_else(|| not_found(time, index))?;
            let task = bucket.get_mut(index).ok_or_else(|| not_found(time, index))?;
            task.enabled = enabled;
        }
        self.save().await?;
        Ok(())
    }

    /// Flat listing of all tasks, sorted by time
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskView> {
        let mut views: Vec<TaskView> = self
            .tasks
            .iter()
            .flat_map(|entry| {
                let time = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .enumerate()
                    .map(|(index, task)| TaskView {
                        time: time.clone(),
                        index,
                        device_id: task.device_id.clone(),
                        action: task.action.clone(),
                        enabled: task.enabled,
                        days: task.days.clone(),
                        added: task.added.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        views.sort_by(|a, b| a.time.cmp(&b.time).then(a.index.cmp(&b.index)));
        views
    }

    /// Commands due at the given time and weekday (0 = Monday).
    ///
    /// Disabled and weekday-mismatched tasks are skipped; stored actions
    /// that no longer parse are warned about and skipped.
    #[must_use]
    pub fn due_commands(&self, time: &str, weekday: u8) -> Vec<(String, Command)> {
        let Some(bucket) = self.tasks.get(time) else {
            return Vec::new();
        };
        bucket
            .iter()
            .filter(|task| task.enabled && task.days.contains(&weekday))
            .filter_map(|task| match task.action.parse::<Command>() {
                Ok(command) => Some((task.device_id.clone(), command)),
                Err(e) => {
                    tracing::warn!(
                        "Skipping task for {} with unparseable action '{}': {}",
                        task.device_id,
                        task.action,
                        e
                    );
                    None
                }
            })
            .collect()
    }

    /// One poll step: when `now`'s minute differs from the last processed
    /// minute, scan the table and return the due commands.
    ///
    /// The minute guard is the only dedup: a task fires at most once per
    /// matching minute, and minutes skipped while the caller stalled are
    /// not backfilled.
    pub fn poll_once(
        &self,
        now: DateTime<Local>,
        last_minute: &mut Option<u32>,
    ) -> Vec<(String, Command)> {
        let minute = now.minute();
        if *last_minute == Some(minute) {
            return Vec::new();
        }
        *last_minute = Some(minute);

        let time = now.format("%H:%M").to_string();
        let weekday = now.weekday().num_days_from_monday() as u8;
        self.due_commands(&time, weekday)
    }

    /// Start the background poller, forwarding due commands to the manager
    pub fn start(self: &Arc<Self>, manager: Arc<DeviceManager>) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            let mut last_minute: Option<u32> = None;
            loop {
                interval.tick().await;
                for (device_id, command) in service.poll_once(Local::now(), &mut last_minute) {
                    tracing::info!("Schedule fired: '{}' for {}", command, device_id);
                    if !manager.send_command(&device_id, &command).await {
                        tracing::warn!(
                            "Scheduled command '{}' for {} was rejected",
                            command,
                            device_id
                        );
                    }
                }
            }
        });

        *self.poller.lock().unwrap() = Some(handle);
        tracing::info!("Schedule poller started ({:?} cadence)", POLL_INTERVAL);
    }

    /// Stop the background poller
    pub fn stop(&self) {
        if let Some(handle) = self.poller.lock().unwrap().take() {
            handle.abort();
            tracing::debug!("Schedule poller stopped");
        }
    }

    async fn save(&self) -> Result<(), ScheduleError> {
        let table: ScheduleTable = self
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        persistence::save_schedule(&self.data_path, &table).await?;
        Ok(())
    }
}

impl Drop for ScheduleService {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }
}

fn not_found(time: &str, index: usize) -> ScheduleError {
    ScheduleError::TaskNotFound {
        time: time.to_string(),
        index,
    }
}

/// Validate `HH:MM` and canonicalize it (zero-padded, 24-hour)
fn validate_time(time: &str) -> Result<String, ScheduleError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map(|parsed| parsed.format("%H:%M").to_string())
        .map_err(|_| ScheduleError::InvalidTimeFormat(time.to_string()))
}

fn validate_days(days: &[u8]) -> Result<(), ScheduleError> {
    match days.iter().find(|day| **day > 6) {
        Some(bad) => Err(ScheduleError::InvalidWeekday(*bad)),
        None => Ok(()),
    }
}
