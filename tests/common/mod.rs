//! Shared test utilities

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use waypost::api::{ApiState, auth, commands, devices, health, telemetry};
use waypost::config::{AuthConfig, CommandConfig, Config, RegistryConfig, TelemetryConfig};
use waypost::{DbPool, db};

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_PASSWORD: &str = "test-password";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Test configuration with fixed credentials
#[must_use]
pub fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: PathBuf::new(),
        static_dir: None,
        auth: AuthConfig {
            username: "admin".to_string(),
            password: TEST_PASSWORD.to_string(),
            token: TEST_TOKEN.to_string(),
        },
        registry: RegistryConfig::default(),
        commands: CommandConfig::default(),
        telemetry: TelemetryConfig::default(),
        simulate: false,
    }
}

/// Shared state over an in-memory database
#[must_use]
pub fn setup_test_state() -> Arc<ApiState> {
    ApiState::new(&test_config(), setup_test_db())
}

/// Build a test API router with the HTTP surface under test
#[must_use]
pub fn build_test_router(state: Arc<ApiState>) -> Router {
    let device_routes = devices::router(state.clone())
        .merge(telemetry::router(state.clone()))
        .merge(commands::router(state.clone()));

    let device_routes = Router::new()
        .nest("/api/devices", device_routes)
        .merge(devices::list_router(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .nest("/api", auth::router(state.clone()))
        .merge(device_routes)
        .merge(health::router())
        .merge(health::ready_router(state))
}
