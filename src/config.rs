//! Configuration management for the Waypost gateway

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Waypost gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Path to data directory (database lives here)
    pub data_dir: PathBuf,

    /// Path to static files directory (web console), if any
    pub static_dir: Option<PathBuf>,

    /// Console authentication configuration
    pub auth: AuthConfig,

    /// Session registry windows
    pub registry: RegistryConfig,

    /// Command channel configuration
    pub commands: CommandConfig,

    /// Telemetry ingestion configuration
    pub telemetry: TelemetryConfig,

    /// Run the demo movement simulator
    pub simulate: bool,
}

/// Console credentials and shared bearer token
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Console username checked by `POST /api/login`
    pub username: String,

    /// Console password checked by `POST /api/login`
    pub password: String,

    /// Shared bearer token (from `WAYPOST_API_TOKEN`).
    /// Minted at startup when unset.
    pub token: String,
}

/// Session registry timing windows
///
/// Both windows are wall-clock heuristics against the last inbound frame;
/// there is no mandatory ping/pong round-trip.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Maximum heartbeat age for a session to count as live
    pub liveness_window: Duration,

    /// Below this heartbeat age an incumbent connection wins over a
    /// competing reconnect
    pub grace_window: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            liveness_window: Duration::from_secs(30),
            grace_window: Duration::from_secs(15),
        }
    }
}

/// Command channel configuration
#[derive(Debug, Clone, Copy)]
pub struct CommandConfig {
    /// Maximum age at which a queued command is still eligible for
    /// pull-delivery
    pub ttl: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
        }
    }
}

/// Telemetry ingestion configuration
#[derive(Debug, Clone, Copy)]
pub struct TelemetryConfig {
    /// Reject location samples whose reported accuracy exceeds this
    /// radius in meters
    pub max_accuracy_m: f64,

    /// Bounded wait for a device to answer a push-then-wait file listing
    /// refresh
    pub listing_wait: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 200.0,
            listing_wait: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Load configuration from the environment with defaults
    ///
    /// # Errors
    ///
    /// Returns error if an environment override cannot be parsed
    pub fn load(port: u16, data_dir: PathBuf, static_dir: Option<PathBuf>, simulate: bool) -> Result<Self> {
        let username = env_or("WAYPOST_CONSOLE_USER", "admin");
        let password = env_or("WAYPOST_CONSOLE_PASSWORD", "");
        if password.is_empty() {
            tracing::warn!("WAYPOST_CONSOLE_PASSWORD not set - console login disabled");
        }

        let token = std::env::var("WAYPOST_API_TOKEN").unwrap_or_else(|_| {
            let minted = uuid::Uuid::new_v4().to_string();
            tracing::info!("WAYPOST_API_TOKEN not set - minted a session token at startup");
            minted
        });

        let registry = RegistryConfig {
            liveness_window: env_secs("WAYPOST_LIVENESS_WINDOW_SECS", 30)?,
            grace_window: env_secs("WAYPOST_GRACE_WINDOW_SECS", 15)?,
        };

        let commands = CommandConfig {
            ttl: env_secs("WAYPOST_COMMAND_TTL_SECS", 30)?,
        };

        let telemetry = TelemetryConfig {
            max_accuracy_m: env_f64("WAYPOST_MAX_ACCURACY_M", 200.0)?,
            listing_wait: env_secs("WAYPOST_LISTING_WAIT_SECS", 2)?,
        };

        Ok(Self {
            port,
            data_dir,
            static_dir,
            auth: AuthConfig {
                username,
                password,
                token,
            },
            registry,
            commands,
            telemetry,
            simulate,
        })
    }

    /// Path to the SQLite database file
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("waypost.db")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}
