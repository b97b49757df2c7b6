//! Background simulation workers
//!
//! The global tick drives most attribute drift; cameras additionally get a
//! dedicated motion worker with its own randomized cadence. Workers are
//! cancelled and joined when their device turns off, so a just-cancelled
//! step can never mutate a device that was reported off.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::Device;
use crate::event::Event;
use crate::event_bus::EventBus;

/// Randomized inter-arrival bounds for motion checks
const MOTION_MIN_DELAY_MS: u64 = 2_000;
const MOTION_MAX_DELAY_MS: u64 = 8_000;
const MOTION_PROBABILITY: f64 = 0.3;

/// One bounded, damped step toward `target`, clamped into `[min, max]`.
pub(crate) fn damped_step(
    old: f64,
    target: f64,
    noise: f64,
    max_step: f64,
    min: f64,
    max: f64,
) -> f64 {
    let step = (0.1 * (target - old) + noise).clamp(-max_step, max_step);
    (old + step).clamp(min, max)
}

/// Handle to a per-device simulation worker
pub(crate) struct SimWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SimWorker {
    /// Cancel the worker and wait until its loop has fully stopped.
    pub(crate) async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                tracing::warn!("Simulation worker ended abnormally: {}", e);
            }
        }
    }
}

/// Spawn the motion worker for a powered-on camera.
///
/// Every mutation happens under the manager's command lock; the token is
/// checked while sleeping, while waiting for the lock, and again after
/// acquiring it.
pub(crate) fn spawn_motion_worker(
    device_id: String,
    devices: Arc<DashMap<String, Device>>,
    command_lock: Arc<Mutex<()>>,
    bus: Arc<EventBus>,
) -> SimWorker {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let handle = tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        tracing::debug!("Motion worker started for {}", device_id);

        loop {
            let delay =
                Duration::from_millis(rng.gen_range(MOTION_MIN_DELAY_MS..=MOTION_MAX_DELAY_MS));
            tokio::select! {
                () = task_token.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            let guard = tokio::select! {
                () = task_token.cancelled() => break,
                guard = command_lock.lock() => guard,
            };
            if task_token.is_cancelled() {
                break;
            }

            let mut events: Vec<Event> = Vec::new();
            match devices.get_mut(&device_id) {
                Some(mut device) => {
                    let detected = rng.gen_bool(MOTION_PROBABILITY);
                    device.record_motion(detected, &mut events);
                }
                None => break,
            }

            for event in &events {
                bus.publish(&event.event_type, event);
            }
            drop(guard);
        }

        tracing::debug!("Motion worker stopped for {}", device_id);
    });

    SimWorker { token, handle }
}
