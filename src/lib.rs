//! Waypost - Location tracking and remote device command gateway
//!
//! This library provides the core functionality for the Waypost gateway:
//! - Device session registry with stale-session arbitration
//! - Bidirectional WebSocket relay (device telemetry in, commands out)
//! - Pull-delivery command queue for devices without a live socket
//! - SQLite-backed device and location history store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Peers                          │
//! │   Trackers (WS / HTTP poll)  │  Observer consoles   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Waypost Gateway                      │
//! │  Session Registry │ Command Queue │ Telemetry Relay │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    SQLite                            │
//! │   devices  │  locations                              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod frames;
pub mod geo;
pub mod registry;
pub mod relay;
pub mod sim;

pub use api::{ApiServer, ApiState};
pub use commands::{CommandChannel, PendingCommand};
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use frames::{CommandFrame, DeviceFrame, DeviceOutbound, LocationReport};
pub use registry::{
    ConnectionHandle, DispatchOutcome, RegisterOutcome, SessionRegistry,
};
pub use relay::{TelemetryEvent, TelemetryRelay};
