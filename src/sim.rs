//! Demo movement simulator
//!
//! Seeds two demo trackers and drifts every persisted device's position on
//! a fixed interval, feeding the same persistence and broadcast paths real
//! devices use. Enabled with `--simulate`; intended for console
//! development without physical trackers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::api::ApiState;
use crate::db::NewLocationSample;
use crate::relay::TelemetryEvent;

const TICK: Duration = Duration::from_secs(5);

/// Demo trackers seeded on startup
const SEEDS: &[(&str, &str, f64, f64, i64)] = &[
    ("sim-alpha", "Tracker Alpha", 54.6872, 25.2797, 100),
    ("sim-beta", "Tracker Beta", 55.0, 26.0, 80),
];

/// Seed demo devices and run the movement loop in a background task
pub fn spawn(state: Arc<ApiState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        seed(&state);
        tracing::info!("movement simulator running");

        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            tick(&state).await;
        }
    })
}

fn seed(state: &ApiState) {
    for &(device_id, name, lat, lng, battery) in SEEDS {
        let already_known = matches!(state.device_repo.get(device_id), Ok(Some(_)));
        if already_known {
            continue;
        }
        if let Err(e) =
            state
                .device_repo
                .record_position(device_id, lat, lng, Some(battery), Some(name), Utc::now())
        {
            tracing::error!(device_id, error = %e, "failed to seed demo device");
        }
    }
}

async fn tick(state: &ApiState) {
    let devices = match state.device_repo.list() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::error!(error = %e, "simulator device list failed");
            return;
        }
    };

    for device in devices {
        let (Some(lat), Some(lng)) = (device.last_lat, device.last_lng) else {
            continue;
        };
        let latitude = lat + jitter();
        let longitude = lng + jitter();
        let timestamp = Utc::now();

        let sample = NewLocationSample {
            device_id: &device.device_id,
            latitude,
            longitude,
            accuracy: None,
            battery: device.battery,
            timestamp,
        };
        if let Err(e) = state.location_repo.insert(&sample) {
            tracing::error!(device_id = %device.device_id, error = %e, "simulator insert failed");
            continue;
        }
        if let Err(e) = state.device_repo.record_position(
            &device.device_id,
            latitude,
            longitude,
            device.battery,
            None,
            timestamp,
        ) {
            tracing::error!(device_id = %device.device_id, error = %e, "simulator update failed");
        }

        let data = serde_json::json!({
            "latitude": latitude,
            "longitude": longitude,
            "battery": device.battery,
        });
        let event = TelemetryEvent::new("location", &device.device_id, data);
        state.relay.lock().await.broadcast(&event);
    }
}

/// Random drift of up to ~0.005 degrees in either direction
fn jitter() -> f64 {
    (rand::random::<f64>() - 0.5) * 0.01
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_state() -> Arc<ApiState> {
        let config = Config {
            port: 0,
            data_dir: std::path::PathBuf::new(),
            static_dir: None,
            auth: crate::config::AuthConfig {
                username: "admin".to_string(),
                password: String::new(),
                token: "t".to_string(),
            },
            registry: crate::config::RegistryConfig::default(),
            commands: crate::config::CommandConfig::default(),
            telemetry: crate::config::TelemetryConfig::default(),
            simulate: true,
        };
        ApiState::new(&config, crate::db::init_memory().unwrap())
    }

    #[tokio::test]
    async fn seed_creates_demo_devices_once() {
        let state = test_state();
        seed(&state);
        seed(&state);
        assert_eq!(state.device_repo.list().unwrap().len(), SEEDS.len());
    }

    #[tokio::test]
    async fn tick_appends_history_and_moves_devices() {
        let state = test_state();
        seed(&state);
        tick(&state).await;

        let history = state.location_repo.history("sim-alpha").unwrap();
        assert_eq!(history.len(), 1);

        let device = state.device_repo.get("sim-alpha").unwrap().unwrap();
        let drift = (device.last_lat.unwrap() - 54.6872).abs();
        assert!(drift <= 0.005 + f64::EPSILON);
    }
}
