//! Tunables and enforced floors for the keepalive subsystem.

use std::time::Duration;

// =============================================================================
// Ping Interval Floors
// =============================================================================

/// Minimum client ping interval. Configured values below this are clamped
/// up at construction time.
pub const MIN_CLIENT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum server ping interval.
pub const MIN_SERVER_PING_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Defaults
// =============================================================================

/// Default wait for a probe response before the connection is declared dead.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default server ping interval.
pub const DEFAULT_SERVER_PING_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// Default minimum spacing the server demands between client pings.
/// A zero `min_time` in [`EnforcementConfig`](crate::EnforcementConfig)
/// means "use this default", not "no spacing required".
pub const DEFAULT_ENFORCEMENT_MIN_TIME: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// Enforcement Tunables
// =============================================================================

/// Strikes tolerated before a too-frequent pinger is rejected. The first
/// violation past the threshold closes the connection, so a single
/// marginal ping (clock jitter) never kills a legitimate client.
pub const MAX_PING_STRIKES: u8 = 2;

/// Inbound ping instants remembered for the rejection log line.
pub const PING_HISTORY_LEN: usize = 8;

// =============================================================================
// Max-Age Jitter
// =============================================================================

/// Max-age deadlines are spread by a uniform factor in
/// `[1 - MAX_AGE_JITTER, 1 + MAX_AGE_JITTER]` to avoid synchronized
/// reconnection storms.
pub const MAX_AGE_JITTER: f64 = 0.10;
