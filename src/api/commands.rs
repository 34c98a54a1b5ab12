//! Operator command dispatch and device polling endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState, api_error};
use crate::Error;
use crate::registry::DispatchOutcome;

/// Command dispatch request body
#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: String,
}

/// Dispatch acknowledgement
///
/// Success is reported unconditionally: push delivery is fire-and-forget
/// and a device without a live session may still pull the command later.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
}

/// Poll response: the pending command, or `action: null`
#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

/// Build command routes (token middleware is applied by the caller)
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/{device_id}/command", post(dispatch_command))
        .route("/{device_id}/command/poll", post(poll_command))
        .with_state(state)
}

/// Issue a command to a device
///
/// Always enqueues for pull delivery, and additionally pushes immediately
/// when the device session is live.
async fn dispatch_command(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    Json(body): Json<CommandBody>,
) -> Result<Json<CommandResponse>, ApiError> {
    let action = body.command.trim().to_lowercase();
    if action.is_empty() {
        return Err(api_error(&Error::Validation("empty command".to_string())));
    }

    state.commands.lock().await.enqueue(&device_id, &action);

    let outcome = state.registry.lock().await.dispatch(&device_id, &action);
    match outcome {
        DispatchOutcome::Delivered => {
            tracing::info!(device_id, action, "command pushed to live session");
        }
        DispatchOutcome::NotConnected => {
            tracing::info!(device_id, action, "device offline, command queued for poll");
        }
    }

    Ok(Json(CommandResponse { success: true }))
}

/// Device pull-delivery poll
///
/// Consumes the pending command if one exists and is unexpired.
async fn poll_command(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Json<PollResponse> {
    let pending = state.commands.lock().await.poll(&device_id);

    let response = pending.map_or(
        PollResponse {
            action: None,
            enqueued_at: None,
        },
        |command| PollResponse {
            action: Some(command.action),
            enqueued_at: Some(command.enqueued_at),
        },
    );
    Json(response)
}
