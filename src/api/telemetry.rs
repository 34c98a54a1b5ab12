//! Telemetry endpoints: HTTP location ingestion and cached snapshot fetches

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, api_error};
use crate::db::NewLocationSample;
use crate::frames::{FileEntry, LocationReport};
use crate::relay::TelemetryEvent;
use crate::{Result, geo};

/// Build telemetry routes (token middleware is applied by the caller)
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/{device_id}/location", post(ingest_location))
        .route("/{device_id}/image", get(latest_image))
        .route("/{device_id}/files", get(latest_files))
        .with_state(state)
}

/// Validate and persist a location report
///
/// Also updates the device row's last known position. Used by both the
/// HTTP ingestion path and the WebSocket frame handler.
pub(crate) fn persist_location(
    state: &ApiState,
    device_id: &str,
    report: &LocationReport,
) -> Result<()> {
    let timestamp = report.timestamp.unwrap_or_else(Utc::now);

    state.location_repo.insert(&NewLocationSample {
        device_id,
        latitude: report.latitude,
        longitude: report.longitude,
        accuracy: report.accuracy,
        battery: report.battery,
        timestamp,
    })?;
    state.device_repo.record_position(
        device_id,
        report.latitude,
        report.longitude,
        report.battery,
        report.device_name.as_deref(),
        timestamp,
    )?;
    Ok(())
}

/// Broadcast a `location` event carrying the report's coordinates
pub(crate) async fn broadcast_location(state: &ApiState, device_id: &str, report: &LocationReport) {
    let data = serde_json::to_value(report).unwrap_or_default();
    let event = TelemetryEvent::new("location", device_id, data);
    state.relay.lock().await.broadcast(&event);
}

/// Success acknowledgement
#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
}

/// HTTP fallback for the WS `location` frame: same validation,
/// persistence, and broadcast
async fn ingest_location(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    Json(report): Json<LocationReport>,
) -> std::result::Result<Json<IngestResponse>, ApiError> {
    geo::validate(&report, state.telemetry.max_accuracy_m).map_err(|e| api_error(&e))?;

    // Ingestion surfaces store failures to the caller
    persist_location(&state, &device_id, &report).map_err(|e| {
        tracing::error!(device_id, error = %e, "location ingestion store failure");
        api_error(&e)
    })?;

    broadcast_location(&state, &device_id, &report).await;
    state.registry.lock().await.touch(&device_id);

    Ok(Json(IngestResponse { success: true }))
}

/// Cached latest-image response
#[derive(Debug, Serialize)]
struct ImageResponse {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    captured_at: Option<DateTime<Utc>>,
}

/// Fetch the cached latest camera frame for a device
///
/// An unknown or never-photographing device gets an explicit
/// not-available body, never an error.
async fn latest_image(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Json<ImageResponse> {
    let registry = state.registry.lock().await;
    let response = registry.latest_image(&device_id).map_or(
        ImageResponse {
            available: false,
            content: None,
            captured_at: None,
        },
        |snapshot| ImageResponse {
            available: true,
            content: Some(BASE64.encode(&snapshot.content)),
            captured_at: Some(snapshot.captured_at),
        },
    );
    Json(response)
}

/// Query parameters for the file listing fetch
#[derive(Debug, Deserialize)]
struct FilesQuery {
    #[serde(default)]
    refresh: bool,
}

/// Cached file-listing response
#[derive(Debug, Serialize)]
struct FilesResponse {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    entries: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    captured_at: Option<DateTime<Utc>>,
}

/// Fetch the cached directory listing for a device
///
/// With `?refresh=true` a `list_files` command is pushed to a live device
/// and the handler waits a bounded interval for a fresher snapshot. This
/// is polling with a timeout, not a guaranteed round-trip: after the wait
/// the best-effort cached (possibly stale or empty) listing is returned.
async fn latest_files(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    Query(query): Query<FilesQuery>,
) -> Json<FilesResponse> {
    if query.refresh {
        let requested_at = Utc::now();
        let pushed = {
            let registry = state.registry.lock().await;
            registry.dispatch(&device_id, "list_files")
        };

        if pushed == crate::registry::DispatchOutcome::Delivered {
            wait_for_listing(&state, &device_id, requested_at).await;
        }
    }

    let registry = state.registry.lock().await;
    let response = registry.latest_file_listing(&device_id).map_or(
        FilesResponse {
            available: false,
            path: None,
            entries: Vec::new(),
            captured_at: None,
        },
        |snapshot| FilesResponse {
            available: true,
            path: snapshot.listing.path.clone(),
            entries: snapshot.listing.entries.clone(),
            captured_at: Some(snapshot.captured_at),
        },
    );
    Json(response)
}

/// Poll the snapshot cache until a listing newer than `requested_at`
/// arrives or the configured wait elapses
async fn wait_for_listing(state: &ApiState, device_id: &str, requested_at: DateTime<Utc>) {
    let deadline = tokio::time::Instant::now() + state.telemetry.listing_wait;
    let step = Duration::from_millis(100);

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(step).await;
        let registry = state.registry.lock().await;
        if registry
            .latest_file_listing(device_id)
            .is_some_and(|snapshot| snapshot.captured_at > requested_at)
        {
            return;
        }
    }
    tracing::debug!(device_id, "file listing refresh timed out, serving cached result");
}
