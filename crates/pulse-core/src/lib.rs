//! pulse-core: keepalive and connection-lifecycle enforcement for
//! point-to-point RPC transports.
//!
//! This crate provides:
//! - Client-side keepalive: probe on inactivity, close on unanswered probe
//! - Server-side lifecycle: idle timeout, jittered max-age with grace period
//! - Enforcement policy: gate client-initiated pings against an abuse policy
//! - Shared per-connection activity tracking
//!
//! The wire layer is out of scope. Callers provide a [`Transport`]
//! implementation (send ping, send GoAway, close) and feed inbound events
//! into the [`ActivityTracker`]; this crate decides *when* those
//! operations happen.

pub mod activity;
pub mod client;
pub mod config;
pub mod constants;
pub mod enforcement;
pub mod error;
pub mod logging;
mod probe;
pub mod server;
pub mod timer;
pub mod transport;

pub use activity::{ActivitySnapshot, ActivityTracker};
pub use client::{start_client_keepalive, KeepaliveHandle};
pub use config::{ClientConfig, EnforcementConfig, ServerConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
pub use server::{start_server_keepalive, ServerKeepaliveHandle};
pub use transport::{CloseReason, GoAwayReason, Transport};
