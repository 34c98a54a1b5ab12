//! HTTP API server for the Waypost gateway

pub mod auth;
pub mod commands;
pub mod devices;
pub mod health;
pub mod telemetry;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{Json, Router, http::StatusCode};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::commands::CommandChannel;
use crate::config::{AuthConfig, Config, TelemetryConfig};
use crate::db::{DbPool, DeviceRepo, LocationRepo};
use crate::registry::SessionRegistry;
use crate::relay::TelemetryRelay;
use crate::{Error, Result};

/// Shared session registry
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// Shared command channel
pub type SharedCommands = Arc<Mutex<CommandChannel>>;

/// Shared telemetry relay
pub type SharedRelay = Arc<Mutex<TelemetryRelay>>;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub device_repo: DeviceRepo,
    pub location_repo: LocationRepo,
    pub registry: SharedRegistry,
    pub commands: SharedCommands,
    pub relay: SharedRelay,
    pub auth: AuthConfig,
    pub telemetry: TelemetryConfig,
}

impl ApiState {
    /// Build shared state from configuration and an initialized pool
    #[must_use]
    pub fn new(config: &Config, db: DbPool) -> Arc<Self> {
        Arc::new(Self {
            device_repo: DeviceRepo::new(db.clone()),
            location_repo: LocationRepo::new(db.clone()),
            db,
            registry: Arc::new(Mutex::new(SessionRegistry::new(config.registry))),
            commands: Arc::new(Mutex::new(CommandChannel::new(config.commands))),
            relay: Arc::new(Mutex::new(TelemetryRelay::new())),
            auth: config.auth.clone(),
            telemetry: config.telemetry,
        })
    }
}

/// Structured JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error type for API handlers: status + structured body
pub type ApiError = (StatusCode, Json<ErrorBody>);

/// Map a gateway error onto an HTTP status and JSON body
pub(crate) fn api_error(err: &Error) -> ApiError {
    let status = match err {
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Create a server from configuration and an initialized pool
    #[must_use]
    pub fn new(config: &Config, db: DbPool) -> Self {
        Self {
            state: ApiState::new(config, db),
            port: config.port,
            static_dir: config.static_dir.clone(),
        }
    }

    /// Shared handler state (used by the simulator)
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        self.state.clone()
    }

    /// Build the router with all routes
    pub(crate) fn router(state: Arc<ApiState>, static_dir: Option<&PathBuf>) -> Router {
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

        let mut router = Router::new()
            .nest("/api", auth::router(state.clone()))
            .merge(device_routes)
            .nest("/ws", ws::router(state.clone()))
            .merge(health::router())
            .merge(health::ready_router(state));

        // Serve the web console if configured
        if let Some(static_dir) = static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from the console
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, Self::router(self.state, self.static_dir.as_ref()))
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
