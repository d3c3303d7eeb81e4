//! Keepalive configuration for both sides of a connection.
//!
//! All durations use `None` for "disabled": a disabled timer simply never
//! fires. Values below an enforced floor are clamped up with a warning at
//! driver start, never rejected — see [`ClientConfig::normalized`] and
//! [`ServerConfig::normalized`]. Configs are immutable once a driver has
//! been started with them.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ENFORCEMENT_MIN_TIME, DEFAULT_PROBE_TIMEOUT, DEFAULT_SERVER_PING_INTERVAL,
    MAX_AGE_JITTER, MIN_CLIENT_PING_INTERVAL, MIN_SERVER_PING_INTERVAL,
};

// ============================================================================
// Client
// ============================================================================

/// Client-side keepalive parameters.
///
/// Configure these in coordination with the server's
/// [`EnforcementConfig`]; a client that probes more often than the server
/// permits will have its connection closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Inactivity duration after which the client pings the server.
    /// `None` disables client keepalive. Values below 10s are clamped.
    pub time: Option<Duration>,
    /// How long to wait for a response to a probe before closing.
    pub timeout: Duration,
    /// If true, pings are sent even with no active streams. If false, the
    /// probe loop stays dormant while the connection is streamless.
    pub permit_without_stream: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            time: None,
            timeout: DEFAULT_PROBE_TIMEOUT,
            permit_without_stream: false,
        }
    }
}

impl ClientConfig {
    /// Create a config with default values (keepalive disabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ping interval.
    pub fn with_time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow pings while the connection has no active streams.
    pub fn with_permit_without_stream(mut self, permit: bool) -> Self {
        self.permit_without_stream = permit;
        self
    }

    /// Apply the 10s ping-interval floor. Called once at driver start;
    /// the clamp is a warning, never an error.
    pub fn normalized(mut self) -> Self {
        if let Some(time) = self.time {
            if time < MIN_CLIENT_PING_INTERVAL {
                tracing::warn!(
                    configured_ms = time.as_millis() as u64,
                    floor_ms = MIN_CLIENT_PING_INTERVAL.as_millis() as u64,
                    "client keepalive interval below floor, clamping"
                );
                self.time = Some(MIN_CLIENT_PING_INTERVAL);
            }
        }
        self
    }
}

// ============================================================================
// Server
// ============================================================================

/// Server-side keepalive and connection-age parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Close (via GoAway) connections that have had no open streams for
    /// this long. Idleness is measured from the most recent instant the
    /// number of open streams became zero, or from connection
    /// establishment. `None` disables the idle timer.
    pub max_connection_idle: Option<Duration>,
    /// Maximum connection lifetime before a GoAway is sent. A ±10% jitter
    /// is applied once per connection to spread out reconnection storms.
    /// `None` means unlimited.
    pub max_connection_age: Option<Duration>,
    /// Additional time after the max-age GoAway before the connection is
    /// forcibly closed, streams or not. `None` waits indefinitely for
    /// in-flight streams to finish.
    pub max_connection_age_grace: Option<Duration>,
    /// Inactivity duration after which the server pings the client.
    /// `None` disables server probing. Values below 1s are clamped.
    pub time: Option<Duration>,
    /// How long to wait for a response to a probe before closing.
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connection_idle: None,
            max_connection_age: None,
            max_connection_age_grace: None,
            time: Some(DEFAULT_SERVER_PING_INTERVAL),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Create a config with default values (2h probe interval, no
    /// idle/age limits).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout.
    pub fn with_max_connection_idle(mut self, idle: Duration) -> Self {
        self.max_connection_idle = Some(idle);
        self
    }

    /// Set the maximum connection age.
    pub fn with_max_connection_age(mut self, age: Duration) -> Self {
        self.max_connection_age = Some(age);
        self
    }

    /// Set the grace period after the max-age GoAway.
    pub fn with_max_connection_age_grace(mut self, grace: Duration) -> Self {
        self.max_connection_age_grace = Some(grace);
        self
    }

    /// Set the ping interval.
    pub fn with_time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply the 1s ping-interval floor. Called once at driver start.
    pub fn normalized(mut self) -> Self {
        if let Some(time) = self.time {
            if time < MIN_SERVER_PING_INTERVAL {
                tracing::warn!(
                    configured_ms = time.as_millis() as u64,
                    floor_ms = MIN_SERVER_PING_INTERVAL.as_millis() as u64,
                    "server keepalive interval below floor, clamping"
                );
                self.time = Some(MIN_SERVER_PING_INTERVAL);
            }
        }
        self
    }
}

/// Apply the one-shot ±10% max-age jitter. Computed once per connection
/// at driver start and fixed as a deadline thereafter.
pub(crate) fn jittered(age: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - MAX_AGE_JITTER..=1.0 + MAX_AGE_JITTER);
    age.mul_f64(factor)
}

// ============================================================================
// Enforcement
// ============================================================================

/// Server-side policy for client-initiated pings. Clients that violate
/// this policy get a GoAway and a closed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// Minimum spacing the client must leave between its pings. A zero
    /// value means "use the 5 minute default", not "no minimum".
    pub min_time: Duration,
    /// If false, a client ping while the connection has no active streams
    /// is rejected outright.
    pub permit_without_stream: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            min_time: DEFAULT_ENFORCEMENT_MIN_TIME,
            permit_without_stream: false,
        }
    }
}

impl EnforcementConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum client ping spacing.
    pub fn with_min_time(mut self, min_time: Duration) -> Self {
        self.min_time = min_time;
        self
    }

    /// Allow client pings while the connection has no active streams.
    pub fn with_permit_without_stream(mut self, permit: bool) -> Self {
        self.permit_without_stream = permit;
        self
    }

    /// Map the zero sentinel to the default minimum spacing.
    pub fn normalized(mut self) -> Self {
        if self.min_time.is_zero() {
            self.min_time = DEFAULT_ENFORCEMENT_MIN_TIME;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.time, None);
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert!(!config.permit_without_stream);
    }

    #[test]
    fn client_time_clamped_to_floor() {
        let config = ClientConfig::new()
            .with_time(Duration::from_secs(5))
            .normalized();
        assert_eq!(config.time, Some(MIN_CLIENT_PING_INTERVAL));
    }

    #[test]
    fn client_time_above_floor_untouched() {
        let config = ClientConfig::new()
            .with_time(Duration::from_secs(30))
            .normalized();
        assert_eq!(config.time, Some(Duration::from_secs(30)));
    }

    #[test]
    fn client_disabled_stays_disabled() {
        let config = ClientConfig::new().normalized();
        assert_eq!(config.time, None);
    }

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.time, Some(Duration::from_secs(7200)));
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.max_connection_idle, None);
        assert_eq!(config.max_connection_age, None);
        assert_eq!(config.max_connection_age_grace, None);
    }

    #[test]
    fn server_time_clamped_to_floor() {
        let config = ServerConfig::new()
            .with_time(Duration::from_millis(100))
            .normalized();
        assert_eq!(config.time, Some(MIN_SERVER_PING_INTERVAL));
    }

    #[test]
    fn enforcement_zero_min_time_means_default() {
        let config = EnforcementConfig::new()
            .with_min_time(Duration::ZERO)
            .normalized();
        assert_eq!(config.min_time, DEFAULT_ENFORCEMENT_MIN_TIME);
    }

    #[test]
    fn enforcement_explicit_min_time_kept() {
        let config = EnforcementConfig::new()
            .with_min_time(Duration::from_secs(30))
            .normalized();
        assert_eq!(config.min_time, Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let age = Duration::from_secs(3600);
        for _ in 0..200 {
            let j = jittered(age);
            assert!(j >= age.mul_f64(0.9), "jittered age {j:?} below -10%");
            assert!(j <= age.mul_f64(1.1), "jittered age {j:?} above +10%");
        }
    }
}
