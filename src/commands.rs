//! Per-device pending-command slot with pull delivery
//!
//! Devices that cannot be reached by push (asleep, NAT, flaky network) poll
//! for their pending command over plain HTTP. Each device holds at most one
//! outstanding command; a newer enqueue overwrites an unconsumed one, and a
//! poll consumes the entry (at-most-once per enqueue).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::CommandConfig;

/// A queued command awaiting pull delivery
#[derive(Debug, Clone)]
pub struct PendingCommand {
    /// Normalized lower-case command name
    pub action: String,
    /// Wall-clock enqueue time, reported to the polling device
    pub enqueued_at: DateTime<Utc>,
    queued: Instant,
}

/// Command channel: one pending slot per device with a short TTL
#[derive(Debug)]
pub struct CommandChannel {
    ttl: Duration,
    pending: HashMap<String, PendingCommand>,
}

impl CommandChannel {
    /// Create an empty channel
    #[must_use]
    pub fn new(config: CommandConfig) -> Self {
        Self {
            ttl: config.ttl,
            pending: HashMap::new(),
        }
    }

    /// Queue a command for a device, overwriting any unconsumed entry
    /// (latest-command-wins)
    pub fn enqueue(&mut self, device_id: &str, action: &str) {
        let action = normalize(action);
        tracing::debug!(device_id, action, "command enqueued");
        self.pending.insert(
            device_id.to_string(),
            PendingCommand {
                action,
                enqueued_at: Utc::now(),
                queued: Instant::now(),
            },
        );
    }

    /// Take the pending command for a device if one exists and is unexpired
    ///
    /// Consumes the entry either way: an expired entry is evicted and
    /// reported as absent.
    pub fn poll(&mut self, device_id: &str) -> Option<PendingCommand> {
        let command = self.pending.remove(device_id)?;
        if command.queued.elapsed() < self.ttl {
            Some(command)
        } else {
            tracing::debug!(device_id, action = %command.action, "expired command evicted");
            None
        }
    }

    /// Number of devices with a pending command
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no commands are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Normalize a command name to its lower-case action form
fn normalize(action: &str) -> String {
    action.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(ttl_secs: u64) -> CommandChannel {
        CommandChannel::new(CommandConfig {
            ttl: Duration::from_secs(ttl_secs),
        })
    }

    #[test]
    fn poll_consumes_exactly_once() {
        let mut commands = channel(30);
        commands.enqueue("dev1", "start_live_stream");

        let taken = commands.poll("dev1").unwrap();
        assert_eq!(taken.action, "start_live_stream");
        assert!(taken.enqueued_at <= Utc::now());

        assert!(commands.poll("dev1").is_none());
    }

    #[test]
    fn latest_command_wins() {
        let mut commands = channel(30);
        commands.enqueue("dev1", "a");
        commands.enqueue("dev1", "b");

        assert_eq!(commands.poll("dev1").unwrap().action, "b");
        assert!(commands.poll("dev1").is_none());
    }

    #[test]
    fn expired_command_reports_absent() {
        // Zero TTL: everything is expired by poll time
        let mut commands = channel(0);
        commands.enqueue("dev1", "start_audio");
        assert!(commands.poll("dev1").is_none());
        assert!(commands.is_empty());
    }

    #[test]
    fn action_is_normalized() {
        let mut commands = channel(30);
        commands.enqueue("dev1", "  Start_Camera ");
        assert_eq!(commands.poll("dev1").unwrap().action, "start_camera");
    }

    #[test]
    fn devices_have_independent_slots() {
        let mut commands = channel(30);
        commands.enqueue("dev1", "a");
        commands.enqueue("dev2", "b");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands.poll("dev2").unwrap().action, "b");
        assert_eq!(commands.poll("dev1").unwrap().action, "a");
    }

    #[test]
    fn poll_without_enqueue_is_empty() {
        let mut commands = channel(30);
        assert!(commands.poll("ghost").is_none());
    }
}
