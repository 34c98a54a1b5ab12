//! Session registry types

use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::frames::{DeviceOutbound, FileListing};

/// Handle to a device's live connection
///
/// The registry entry owns the handle exclusively; on reconnect it is
/// replaced, never shared. The `id` distinguishes a superseded connection's
/// late close event from the replacement's.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<DeviceOutbound>,
}

impl ConnectionHandle {
    /// Wrap a device connection's outbound sender
    #[must_use]
    pub fn new(tx: mpsc::Sender<DeviceOutbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Unique identity of this connection
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the connection's send side is still open
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue an outbound message; returns false when the send fails
    pub fn send(&self, outbound: DeviceOutbound) -> bool {
        self.tx.try_send(outbound).is_ok()
    }

    /// Ask the connection's send task to tear the transport down
    pub fn close(&self) {
        let _ = self.tx.try_send(DeviceOutbound::Close);
    }
}

/// Cached latest camera frame for a device
#[derive(Debug, Clone)]
pub struct ImageSnapshot {
    pub content: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Cached latest directory listing for a device
#[derive(Debug, Clone)]
pub struct ListingSnapshot {
    pub listing: FileListing,
    pub captured_at: DateTime<Utc>,
}

/// One currently-connected device
#[derive(Debug)]
pub struct DeviceSession {
    pub connection: ConnectionHandle,
    pub last_seen: Instant,
    pub latest_image: Option<ImageSnapshot>,
    pub latest_file_listing: Option<ListingSnapshot>,
}

/// Result of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Connection registered; the caller owns the session until close
    Accepted,
    /// An active session already exists; the new connection must close
    Rejected,
}

/// Result of a push dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A command frame was pushed over the live connection
    Delivered,
    /// No live session; the caller relies on pull delivery
    NotConnected,
}
