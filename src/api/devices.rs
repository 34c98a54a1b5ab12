//! Device REST endpoints: listing, history, rename, delete, export

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, api_error};
use crate::Error;
use crate::db::{Device, LocationSample};

/// Summary row for the device list
#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub device_name: Option<String>,
    pub battery: Option<i64>,
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
    pub last_location: Option<LastLocation>,
    /// Whether a live session is currently registered
    pub connected: bool,
}

/// Last known coordinates
#[derive(Debug, Serialize)]
pub struct LastLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Device detail with full history
#[derive(Debug, Serialize)]
pub struct DeviceDetail {
    pub device_name: Option<String>,
    pub locations: Vec<LocationSample>,
}

/// History-only response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub locations: Vec<LocationSample>,
}

/// Full export: device row plus history
#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub device_id: String,
    pub device_name: Option<String>,
    pub battery: Option<i64>,
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
    pub last_lat: Option<f64>,
    pub last_lng: Option<f64>,
    pub locations: Vec<LocationSample>,
}

/// Rename request body
#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub name: String,
}

/// Success acknowledgement
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Build device routes (token middleware is applied by the caller)
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_devices))
        .route("/{device_id}", get(get_device))
        .route("/{device_id}", delete(delete_device))
        .route("/{device_id}/history", get(get_history))
        .route("/{device_id}/export", get(export_device))
        .route("/{device_id}/rename", post(rename_device))
        .with_state(state)
}

/// Collection route for the trailing-slash form of the device list.
///
/// Nested routers cannot express `/api/devices/` (nesting maps the inner
/// `/` route to the bare prefix), so this is merged at the top level.
pub fn list_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/devices/", get(list_devices))
        .with_state(state)
}

fn summary(device: Device, connected: bool) -> DeviceSummary {
    let last_location = match (device.last_lat, device.last_lng) {
        (Some(lat), Some(lng)) => Some(LastLocation { lat, lng }),
        _ => None,
    };
    DeviceSummary {
        device_id: device.device_id,
        device_name: device.device_name,
        battery: device.battery,
        last_seen: device.last_seen,
        last_location,
        connected,
    }
}

/// List persisted devices annotated with live status
async fn list_devices(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<DeviceSummary>>, ApiError> {
    let devices = state.device_repo.list().map_err(|e| api_error(&e))?;

    let registry = state.registry.lock().await;
    let summaries = devices
        .into_iter()
        .map(|device| {
            let connected = registry.is_live(&device.device_id);
            summary(device, connected)
        })
        .collect();
    Ok(Json(summaries))
}

/// Device detail with location history
async fn get_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceDetail>, ApiError> {
    let device = state
        .device_repo
        .get(&device_id)
        .map_err(|e| api_error(&e))?
        .ok_or_else(|| api_error(&Error::NotFound(format!("device '{device_id}'"))))?;

    let locations = state
        .location_repo
        .history(&device_id)
        .map_err(|e| api_error(&e))?;

    Ok(Json(DeviceDetail {
        device_name: device.device_name,
        locations,
    }))
}

/// Location history only
async fn get_history(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let locations = state
        .location_repo
        .history(&device_id)
        .map_err(|e| api_error(&e))?;
    Ok(Json(HistoryResponse { locations }))
}

/// Full export of a device and its history
async fn export_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Json<ExportResponse>, ApiError> {
    let device = state
        .device_repo
        .get(&device_id)
        .map_err(|e| api_error(&e))?
        .ok_or_else(|| api_error(&Error::NotFound(format!("device '{device_id}'"))))?;

    let locations = state
        .location_repo
        .history(&device_id)
        .map_err(|e| api_error(&e))?;

    Ok(Json(ExportResponse {
        device_id: device.device_id,
        device_name: device.device_name,
        battery: device.battery,
        last_seen: device.last_seen,
        last_lat: device.last_lat,
        last_lng: device.last_lng,
        locations,
    }))
}

/// Set a device's display name
async fn rename_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .device_repo
        .rename(&device_id, &body.name)
        .map_err(|e| api_error(&e))?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Delete a device and its location history
async fn delete_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .device_repo
        .delete(&device_id)
        .map_err(|e| api_error(&e))?;
    state
        .location_repo
        .delete_for_device(&device_id)
        .map_err(|e| api_error(&e))?;
    tracing::info!(device_id, "device deleted");
    Ok(Json(SuccessResponse { success: true }))
}
