//! Connection gateway: WebSocket endpoints for devices and observers
//!
//! The transport is shared between two semantically different peers, so
//! every upgrade is classified as exactly one of observer or
//! device(`device_id`); anything else never upgrades. Devices hand their
//! connection to the session registry, observers to the telemetry relay.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ApiState, telemetry};
use crate::frames::{DeviceFrame, DeviceOutbound};
use crate::geo;
use crate::registry::{ConnectionHandle, RegisterOutcome};
use crate::relay::TelemetryEvent;

/// Query parameters for the device endpoint
#[derive(Debug, Deserialize)]
struct DeviceWsQuery {
    device_id: Option<String>,
}

/// Build the WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/observer", get(observer_upgrade))
        .route("/device", get(device_upgrade_query))
        .route("/device/{device_id}", get(device_upgrade_path))
        .with_state(state)
}

/// Observer upgrade: web-console clients subscribing to telemetry
async fn observer_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer_socket(socket, state))
}

/// Device upgrade with the identifier as a trailing path segment
async fn device_upgrade_path(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_device_socket(socket, state, device_id))
}

/// Device upgrade with the identifier as a query parameter
async fn device_upgrade_query(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<DeviceWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let device_id = query.device_id.unwrap_or_default();
    ws.on_upgrade(move |socket| handle_device_socket(socket, state, device_id))
}

/// Handle a connected observer socket
async fn handle_observer_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let observer_id = state.relay.lock().await.subscribe(tx);
    tracing::info!(observer = %observer_id, "observer connected");

    // Forward broadcast events to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Observers send nothing meaningful; watch for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.relay.lock().await.unsubscribe(observer_id);
    tracing::info!(observer = %observer_id, "observer disconnected");
}

/// Handle a connected device socket
async fn handle_device_socket(socket: WebSocket, state: Arc<ApiState>, device_id: String) {
    let (mut sender, mut receiver) = socket.split();

    if device_id.is_empty() {
        tracing::warn!("device connection without identifier, closing");
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let (tx, mut rx) = mpsc::channel::<DeviceOutbound>(32);
    let handle = ConnectionHandle::new(tx.clone());
    let connection_id = handle.id();

    let outcome = state.registry.lock().await.register(&device_id, handle);
    if outcome == RegisterOutcome::Rejected {
        // Incumbent wins: close the newcomer with a normal closure
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    // Forward queued outbound frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let message = match outbound {
                DeviceOutbound::Command(frame) => match serde_json::to_string(&frame) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize command frame");
                        continue;
                    }
                },
                DeviceOutbound::Pong => Message::Text(r#"{"type":"pong"}"#.to_string().into()),
                DeviceOutbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Handle inbound frames in arrival order
    let recv_state = state.clone();
    let recv_device_id = device_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_device_frame(&recv_state, &recv_device_id, &text, &tx).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Only evicts when this connection still owns the entry
    state
        .registry
        .lock()
        .await
        .unregister(&device_id, connection_id);
}

/// Process one inbound device frame
///
/// Malformed frames are dropped and logged; the connection stays open.
async fn handle_device_frame(
    state: &Arc<ApiState>,
    device_id: &str,
    text: &str,
    reply: &mpsc::Sender<DeviceOutbound>,
) {
    let Some(frame) = DeviceFrame::parse(text) else {
        tracing::debug!(device_id, "malformed frame dropped");
        return;
    };

    state.registry.lock().await.touch(device_id);

    match frame {
        DeviceFrame::Ping => {
            let _ = reply.try_send(DeviceOutbound::Pong);
        }
        DeviceFrame::Location(report) => {
            if let Err(e) = geo::validate(&report, state.telemetry.max_accuracy_m) {
                tracing::warn!(device_id, error = %e, "location frame rejected");
                return;
            }
            // Telemetry display is best-effort even when durability fails
            if let Err(e) = telemetry::persist_location(state, device_id, &report) {
                tracing::error!(device_id, error = %e, "location store failure, broadcasting anyway");
            }
            telemetry::broadcast_location(state, device_id, &report).await;
        }
        DeviceFrame::Image { content, .. } => {
            match BASE64.decode(&content) {
                Ok(blob) => state.registry.lock().await.record_image(device_id, blob),
                Err(e) => tracing::warn!(device_id, error = %e, "image payload not base64, snapshot skipped"),
            }
            broadcast(state, "image", device_id, Value::String(content)).await;
        }
        DeviceFrame::Audio { content, .. } => {
            broadcast(state, "audio", device_id, Value::String(content)).await;
        }
        DeviceFrame::FileList(listing) => {
            // Served on demand through the files endpoint, not broadcast
            state
                .registry
                .lock()
                .await
                .record_file_listing(device_id, listing);
        }
        DeviceFrame::FileDownload(data) => {
            broadcast(state, "file_download", device_id, data).await;
        }
        DeviceFrame::Other { kind, data } => {
            // Forward-compatibility passthrough for observer-side handling
            broadcast(state, &kind, device_id, data).await;
        }
    }
}

async fn broadcast(state: &Arc<ApiState>, kind: &str, device_id: &str, data: Value) {
    let event = TelemetryEvent::new(kind, device_id, data);
    state.relay.lock().await.broadcast(&event);
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::{
        AuthConfig, CommandConfig, Config, RegistryConfig, TelemetryConfig,
    };

    fn test_state() -> Arc<ApiState> {
        let config = Config {
            port: 0,
            data_dir: PathBuf::new(),
            static_dir: None,
            auth: AuthConfig {
                username: "admin".to_string(),
                password: String::new(),
                token: "t".to_string(),
            },
            registry: RegistryConfig::default(),
            commands: CommandConfig::default(),
            telemetry: TelemetryConfig::default(),
            simulate: false,
        };
        ApiState::new(&config, crate::db::init_memory().unwrap())
    }

    async fn connected_device(
        state: &Arc<ApiState>,
        device_id: &str,
    ) -> (mpsc::Sender<DeviceOutbound>, mpsc::Receiver<DeviceOutbound>) {
        let (tx, rx) = mpsc::channel(8);
        state
            .registry
            .lock()
            .await
            .register(device_id, ConnectionHandle::new(tx.clone()));
        (tx, rx)
    }

    async fn observe(state: &Arc<ApiState>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        state.relay.lock().await.subscribe(tx);
        rx
    }

    #[tokio::test]
    async fn location_frame_stores_one_sample_and_broadcasts_one_event() {
        let state = test_state();
        let (reply, _device_rx) = connected_device(&state, "dev1").await;
        let mut observer = observe(&state).await;

        let text = r#"{"type":"location","data":{"latitude":54.6872,"longitude":25.2797,"battery":66}}"#;
        handle_device_frame(&state, "dev1", text, &reply).await;

        let event: Value = serde_json::from_str(&observer.try_recv().unwrap()).unwrap();
        assert_eq!(event["type"], "location");
        assert_eq!(event["deviceId"], "dev1");
        assert!((event["data"]["latitude"].as_f64().unwrap() - 54.6872).abs() < 1e-9);
        assert!((event["data"]["longitude"].as_f64().unwrap() - 25.2797).abs() < 1e-9);
        // Exactly one event
        assert!(observer.try_recv().is_err());

        let history = state.location_repo.history("dev1").unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].latitude - 54.6872).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejected_location_frame_is_neither_stored_nor_broadcast() {
        let state = test_state();
        let (reply, _device_rx) = connected_device(&state, "dev1").await;
        let mut observer = observe(&state).await;

        let text = r#"{"type":"location","data":{"latitude":95.0,"longitude":25.0}}"#;
        handle_device_frame(&state, "dev1", text, &reply).await;

        assert!(observer.try_recv().is_err());
        assert!(state.location_repo.history("dev1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn ping_frame_replies_pong_without_broadcast() {
        let state = test_state();
        let (reply, mut device_rx) = connected_device(&state, "dev1").await;
        let mut observer = observe(&state).await;

        handle_device_frame(&state, "dev1", r#"{"type":"ping"}"#, &reply).await;

        assert!(matches!(device_rx.try_recv(), Ok(DeviceOutbound::Pong)));
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_silently() {
        let state = test_state();
        let (reply, _device_rx) = connected_device(&state, "dev1").await;
        let mut observer = observe(&state).await;

        handle_device_frame(&state, "dev1", "not json", &reply).await;

        assert!(observer.try_recv().is_err());
        assert!(state.location_repo.history("dev1").unwrap().is_empty());
    }
}
