//! Telemetry fan-out to observer connections
//!
//! Inbound device events are broadcast to every subscribed web-console
//! client. Delivery is best-effort: no backpressure, no replay, and a
//! failure sending to one observer never aborts delivery to the rest.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event broadcast to observers
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Build an event stamped with the current time
    #[must_use]
    pub fn new(kind: &str, device_id: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            device_id: device_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast set of observer connections
#[derive(Debug, Default)]
pub struct TelemetryRelay {
    observers: HashMap<Uuid, mpsc::Sender<String>>,
}

impl TelemetryRelay {
    /// Create an empty relay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; returns the id used to unsubscribe
    pub fn subscribe(&mut self, tx: mpsc::Sender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.observers.insert(id, tx);
        tracing::debug!(observer = %id, count = self.observers.len(), "observer subscribed");
        id
    }

    /// Remove an observer; idempotent
    pub fn unsubscribe(&mut self, id: Uuid) {
        if self.observers.remove(&id).is_some() {
            tracing::debug!(observer = %id, count = self.observers.len(), "observer unsubscribed");
        }
    }

    /// Broadcast an event to every open observer
    ///
    /// The event is serialized once. A failed send is logged and isolated to
    /// that observer; observers whose channel has closed are dropped lazily.
    pub fn broadcast(&mut self, event: &TelemetryEvent) {
        let Ok(text) = serde_json::to_string(event) else {
            tracing::error!(kind = %event.kind, "failed to serialize telemetry event");
            return;
        };

        self.observers.retain(|id, tx| {
            if tx.is_closed() {
                tracing::debug!(observer = %id, "dropping closed observer");
                return false;
            }
            if let Err(e) = tx.try_send(text.clone()) {
                tracing::warn!(observer = %id, error = %e, "observer send failed");
            }
            true
        });
    }

    /// Number of subscribed observers
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are subscribed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
