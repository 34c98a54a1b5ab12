//! Wire frames exchanged with devices
//!
//! Devices send loosely-typed JSON frames `{type, data?, timestamp?}`.
//! Known kinds parse into a closed enum; unknown kinds map to an explicit
//! passthrough variant so observers can handle new frame types without a
//! gateway release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw inbound frame envelope as it appears on the wire
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// A location report from a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub battery: Option<i64>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A single entry in a device file listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub is_dir: bool,
}

/// A directory listing reported by a device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub entries: Vec<FileEntry>,
}

/// Decoded inbound device frame
#[derive(Debug, Clone)]
pub enum DeviceFrame {
    /// Keepalive heartbeat
    Ping,
    /// GPS sample
    Location(LocationReport),
    /// Camera frame, base64-encoded
    Image { content: String, timestamp: Option<DateTime<Utc>> },
    /// Audio chunk, base64-encoded
    Audio { content: String, timestamp: Option<DateTime<Utc>> },
    /// Directory listing snapshot
    FileList(FileListing),
    /// Downloaded file payload forwarded to observers
    FileDownload(Value),
    /// Unrecognized frame kind, forwarded as-is
    Other { kind: String, data: Value },
}

impl DeviceFrame {
    /// Parse a raw text frame
    ///
    /// Returns `None` for malformed frames (bad JSON, or a known kind whose
    /// payload does not fit); callers drop and log those without closing
    /// the connection.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let raw: RawFrame = serde_json::from_str(text).ok()?;

        match raw.kind.as_str() {
            "ping" => Some(Self::Ping),
            "location" => serde_json::from_value(raw.data).ok().map(Self::Location),
            "image" => payload_string(&raw.data).map(|content| Self::Image {
                content,
                timestamp: raw.timestamp,
            }),
            "audio" => payload_string(&raw.data).map(|content| Self::Audio {
                content,
                timestamp: raw.timestamp,
            }),
            "file_list" => serde_json::from_value(raw.data).ok().map(Self::FileList),
            "file_download" => Some(Self::FileDownload(raw.data)),
            _ => Some(Self::Other {
                kind: raw.kind,
                data: raw.data,
            }),
        }
    }
}

/// Extract a base64 payload that may arrive as a bare string or wrapped
/// in `{"data": "..."}`
fn payload_string(data: &Value) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("data").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Command frame pushed to a device
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame {
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl CommandFrame {
    /// Build a command frame stamped with the current time
    #[must_use]
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Outbound message queued for a device connection's send task
#[derive(Debug, Clone)]
pub enum DeviceOutbound {
    /// Command frame to deliver
    Command(CommandFrame),
    /// Heartbeat reply
    Pong,
    /// Tear down the connection (used when superseding a stale session)
    Close,
}
