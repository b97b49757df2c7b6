//! hacienda - simulated smart-home runtime daemon
//!
//! Wires the device runtime together: restores the snapshot, starts the
//! global tick driver and the schedule poller, and logs state changes and
//! alarms the way a notification front end would consume them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use device_core::{topics, Device, DeviceKind, DeviceManager, EventBus, StateStore};
use schedule_engine::ScheduleService;

/// Default cadence for the global simulation tick
const DEFAULT_TICK_INTERVAL_SECS: u64 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hacienda_daemon=debug,device_core=debug,schedule_engine=debug,info".into()
            }),
        )
        .init();

    tracing::info!("Starting hacienda runtime");

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let tick_interval = std::env::var("TICK_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TICK_INTERVAL_SECS);

    let bus = Arc::new(EventBus::new());
    let store = StateStore::new(data_dir.join("devices.json"));
    let manager = Arc::new(DeviceManager::new(Arc::clone(&bus), store));

    for device in default_devices() {
        manager.add_device(device);
    }
    manager.restore().await;

    // Consume state changes and alarms the way the notification layer does.
    bus.subscribe(topics::DEVICE_STATE_CHANGED, |event| {
        tracing::info!("{} changed state: {}", event.device_id, event.payload);
    });
    bus.subscribe(topics::DEVICE_ALARM, |event| {
        tracing::warn!("Alarm from {}: {}", event.device_id, event.payload);
    });

    let schedule = Arc::new(ScheduleService::new(&data_dir).await);
    schedule.start(Arc::clone(&manager));

    // Global tick driver for device simulation.
    let tick_manager = Arc::clone(&manager);
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_interval));
        loop {
            interval.tick().await;
            tick_manager.tick_all().await;
        }
    });

    tracing::info!(
        "Runtime ready: {} devices, tick every {}s, data in {:?}",
        manager.devices().len(),
        tick_interval,
        data_dir
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    ticker.abort();
    schedule.stop();
    manager.shutdown().await;

    Ok(())
}

fn default_devices() -> Vec<Device> {
    vec![
        Device::new("lamp_living_room", "Living Room Light", DeviceKind::Light),
        Device::new("thermostat", "Thermostat", DeviceKind::Thermostat),
        Device::new("security_camera", "Security Camera", DeviceKind::Camera),
        Device::new("smoke_sensor", "Smoke Sensor", DeviceKind::SmokeSensor),
        Device::new("water_leak_sensor", "Water Leak Sensor", DeviceKind::WaterLeakSensor),
    ]
}
