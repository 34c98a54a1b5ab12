//! Session registry for tracking connected devices
//!
//! Owns the map from device identifier to its live connection, last-seen
//! time, and cached latest-telemetry snapshots. All connection-replacement
//! arbitration lives here: at most one live connection per device at any
//! instant.

mod types;

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;

use crate::config::RegistryConfig;
use crate::frames::{CommandFrame, DeviceOutbound, FileListing};

pub use types::{
    ConnectionHandle, DeviceSession, DispatchOutcome, ImageSnapshot, ListingSnapshot,
    RegisterOutcome,
};

/// Registry of connected device sessions
#[derive(Debug)]
pub struct SessionRegistry {
    config: RegistryConfig,
    sessions: HashMap<String, DeviceSession>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Register a device connection
    ///
    /// When an entry already exists with an open connection, the incumbent
    /// wins if it heartbeated within the grace window (reconnect storms must
    /// not duplicate sessions); otherwise the incumbent is force-closed and
    /// replaced. A closed incumbent is replaced unconditionally. Cached
    /// snapshots survive replacement.
    pub fn register(&mut self, device_id: &str, connection: ConnectionHandle) -> RegisterOutcome {
        if device_id.is_empty() {
            tracing::warn!("rejecting connection with empty device id");
            return RegisterOutcome::Rejected;
        }

        let mut latest_image = None;
        let mut latest_file_listing = None;

        if let Some(existing) = self.sessions.get(device_id) {
            if existing.connection.is_open() {
                let age = existing.last_seen.elapsed();
                if age < self.config.grace_window {
                    tracing::info!(
                        device_id,
                        age_ms = age.as_millis(),
                        "active session exists, rejecting reconnect"
                    );
                    return RegisterOutcome::Rejected;
                }
                tracing::info!(
                    device_id,
                    age_ms = age.as_millis(),
                    "superseding stale session"
                );
                existing.connection.close();
            }
        }

        if let Some(old) = self.sessions.remove(device_id) {
            latest_image = old.latest_image;
            latest_file_listing = old.latest_file_listing;
        }

        self.sessions.insert(
            device_id.to_string(),
            DeviceSession {
                connection,
                last_seen: Instant::now(),
                latest_image,
                latest_file_listing,
            },
        );

        tracing::info!(device_id, "device session registered");
        RegisterOutcome::Accepted
    }

    /// Refresh a device's last-seen time; called on every inbound frame
    pub fn touch(&mut self, device_id: &str) {
        if let Some(session) = self.sessions.get_mut(device_id) {
            session.last_seen = Instant::now();
        }
    }

    /// Overwrite the cached latest camera frame
    pub fn record_image(&mut self, device_id: &str, content: Vec<u8>) {
        if let Some(session) = self.sessions.get_mut(device_id) {
            session.latest_image = Some(ImageSnapshot {
                content,
                captured_at: Utc::now(),
            });
        }
    }

    /// Overwrite the cached latest directory listing
    pub fn record_file_listing(&mut self, device_id: &str, listing: FileListing) {
        if let Some(session) = self.sessions.get_mut(device_id) {
            session.latest_file_listing = Some(ListingSnapshot {
                listing,
                captured_at: Utc::now(),
            });
        }
    }

    /// Cached latest camera frame, if any
    #[must_use]
    pub fn latest_image(&self, device_id: &str) -> Option<&ImageSnapshot> {
        self.sessions
            .get(device_id)
            .and_then(|s| s.latest_image.as_ref())
    }

    /// Cached latest directory listing, if any
    #[must_use]
    pub fn latest_file_listing(&self, device_id: &str) -> Option<&ListingSnapshot> {
        self.sessions
            .get(device_id)
            .and_then(|s| s.latest_file_listing.as_ref())
    }

    /// Remove a session, but only when the stored connection identity
    /// matches the caller's
    ///
    /// A delayed close event from a superseded connection must not evict
    /// the replacement session.
    pub fn unregister(&mut self, device_id: &str, connection_id: uuid::Uuid) -> bool {
        match self.sessions.get(device_id) {
            Some(session) if session.connection.id() == connection_id => {
                self.sessions.remove(device_id);
                tracing::info!(device_id, "device session unregistered");
                true
            }
            Some(_) => {
                tracing::debug!(
                    device_id,
                    "close from superseded connection ignored"
                );
                false
            }
            None => false,
        }
    }

    /// Whether a device has a live session: open connection and a heartbeat
    /// within the liveness window
    #[must_use]
    pub fn is_live(&self, device_id: &str) -> bool {
        self.sessions.get(device_id).is_some_and(|session| {
            session.connection.is_open()
                && session.last_seen.elapsed() < self.config.liveness_window
        })
    }

    /// Push a command frame to a live device connection
    ///
    /// A send that errors mid-flight is logged and swallowed; the
    /// connection's own close handler evicts the session later.
    pub fn dispatch(&self, device_id: &str, action: &str) -> DispatchOutcome {
        if !self.is_live(device_id) {
            return DispatchOutcome::NotConnected;
        }
        let Some(session) = self.sessions.get(device_id) else {
            return DispatchOutcome::NotConnected;
        };

        let frame = CommandFrame::new(action);
        if session.connection.send(DeviceOutbound::Command(frame)) {
            tracing::debug!(device_id, action, "command pushed");
        } else {
            tracing::warn!(
                device_id,
                action,
                "command push failed, leaving eviction to the close handler"
            );
        }
        DispatchOutcome::Delivered
    }

    /// Number of registered sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry has no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<DeviceOutbound>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(tx), rx)
    }

    fn config(grace_secs: u64, liveness_secs: u64) -> RegistryConfig {
        RegistryConfig {
            grace_window: Duration::from_secs(grace_secs),
            liveness_window: Duration::from_secs(liveness_secs),
        }
    }

    #[test]
    fn registers_first_connection() {
        let mut registry = SessionRegistry::new(config(15, 30));
        let (conn, _rx) = handle();
        assert_eq!(registry.register("dev1", conn), RegisterOutcome::Accepted);
        assert!(registry.is_live("dev1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_empty_device_id() {
        let mut registry = SessionRegistry::new(config(15, 30));
        let (conn, _rx) = handle();
        assert_eq!(registry.register("", conn), RegisterOutcome::Rejected);
        assert!(registry.is_empty());
    }

    #[test]
    fn reconnect_within_grace_window_is_rejected() {
        let mut registry = SessionRegistry::new(config(3600, 3600));
        let (incumbent, _rx1) = handle();
        let incumbent_id = incumbent.id();
        registry.register("dev1", incumbent);

        let (challenger, _rx2) = handle();
        assert_eq!(registry.register("dev1", challenger), RegisterOutcome::Rejected);

        // Incumbent stays registered and live
        assert!(registry.is_live("dev1"));
        assert!(registry.unregister("dev1", incumbent_id));
    }

    #[test]
    fn stale_session_is_replaced_and_incumbent_closed() {
        // Zero grace window: any existing session counts as stale
        let mut registry = SessionRegistry::new(config(0, 3600));
        let (incumbent, mut rx1) = handle();
        registry.register("dev1", incumbent);

        let (challenger, mut rx2) = handle();
        let challenger_id = challenger.id();
        assert_eq!(registry.register("dev1", challenger), RegisterOutcome::Accepted);

        // The superseded connection got a close request
        assert!(matches!(rx1.try_recv(), Ok(DeviceOutbound::Close)));

        // Subsequent dispatch uses the new connection
        assert_eq!(registry.dispatch("dev1", "stop_audio"), DispatchOutcome::Delivered);
        assert!(matches!(rx2.try_recv(), Ok(DeviceOutbound::Command(_))));

        // And the new connection owns the entry
        assert!(registry.unregister("dev1", challenger_id));
    }

    #[test]
    fn closed_incumbent_is_replaced_unconditionally() {
        let mut registry = SessionRegistry::new(config(3600, 3600));
        let (incumbent, rx1) = handle();
        registry.register("dev1", incumbent);
        drop(rx1); // connection closed

        let (challenger, _rx2) = handle();
        assert_eq!(registry.register("dev1", challenger), RegisterOutcome::Accepted);
        assert!(registry.is_live("dev1"));
    }

    #[test]
    fn at_most_one_session_per_device() {
        let mut registry = SessionRegistry::new(config(0, 3600));
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (conn, rx) = handle();
            registry.register("dev1", conn);
            receivers.push(rx);
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_requires_matching_connection() {
        let mut registry = SessionRegistry::new(config(0, 3600));
        let (old, _rx1) = handle();
        let old_id = old.id();
        registry.register("dev1", old);

        let (new, _rx2) = handle();
        registry.register("dev1", new);

        // Late close from the superseded connection must not evict
        assert!(!registry.unregister("dev1", old_id));
        assert!(registry.is_live("dev1"));
    }

    #[test]
    fn dropped_connection_is_not_live() {
        let mut registry = SessionRegistry::new(config(15, 30));
        let (conn, rx) = handle();
        registry.register("dev1", conn);
        drop(rx);
        assert!(!registry.is_live("dev1"));
    }

    #[test]
    fn liveness_window_zero_means_never_live() {
        let mut registry = SessionRegistry::new(config(15, 0));
        let (conn, _rx) = handle();
        registry.register("dev1", conn);
        assert!(!registry.is_live("dev1"));
        assert_eq!(registry.dispatch("dev1", "ping"), DispatchOutcome::NotConnected);
    }

    #[test]
    fn dispatch_to_unknown_device_reports_not_connected() {
        let registry = SessionRegistry::new(config(15, 30));
        assert_eq!(registry.dispatch("ghost", "stop_audio"), DispatchOutcome::NotConnected);
    }

    #[test]
    fn snapshots_round_trip_and_survive_replacement() {
        let mut registry = SessionRegistry::new(config(0, 3600));
        let (conn, _rx) = handle();
        registry.register("dev1", conn);

        registry.record_image("dev1", vec![1, 2, 3]);
        let snap = registry.latest_image("dev1").unwrap();
        assert_eq!(snap.content, vec![1, 2, 3]);
        assert!(snap.captured_at <= Utc::now());

        let (replacement, _rx2) = handle();
        registry.register("dev1", replacement);
        assert!(registry.latest_image("dev1").is_some());
    }

    #[test]
    fn snapshot_for_unregistered_device_is_absent() {
        let registry = SessionRegistry::new(config(15, 30));
        assert!(registry.latest_image("ghost").is_none());
        assert!(registry.latest_file_listing("ghost").is_none());
    }

    #[test]
    fn snapshot_record_for_unknown_device_is_a_noop() {
        let mut registry = SessionRegistry::new(config(15, 30));
        registry.record_image("ghost", vec![0]);
        assert!(registry.latest_image("ghost").is_none());
    }
}
