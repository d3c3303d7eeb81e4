//! Server-side gate for client-initiated keepalive pings.
//!
//! The engine never decides to probe; it only inspects inbound pings and
//! decides whether to tolerate them or condemn the connection. Frequency
//! abuse accrues strikes so a single marginal ping (clock jitter on an
//! otherwise well-behaved client) is tolerated; repeated violations are
//! not.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::config::EnforcementConfig;
use crate::constants::{MAX_PING_STRIKES, PING_HISTORY_LEN};
use crate::transport::GoAwayReason;

/// Outcome of inspecting one inbound ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingVerdict {
    /// Within policy; the ping becomes the new "last tolerated".
    Tolerated,
    /// Too soon after the last tolerated ping, but within the strike
    /// budget. The connection stays up.
    Strike { strikes: u8 },
    /// Policy violated; the connection must be closed with this GoAway
    /// reason.
    Reject(GoAwayReason),
}

/// Tracks one connection's inbound-ping behavior against the policy.
#[derive(Debug)]
pub struct EnforcementEngine {
    config: EnforcementConfig,
    /// Timestamp of the most recently tolerated ping.
    last_tolerated: Option<Instant>,
    strikes: u8,
    /// Recent inbound ping instants, kept for the rejection log line.
    recent: VecDeque<Instant>,
}

impl EnforcementEngine {
    /// Create an engine with a normalized config (zero `min_time` has
    /// already been mapped to the default).
    pub fn new(config: EnforcementConfig) -> Self {
        Self {
            config: config.normalized(),
            last_tolerated: None,
            strikes: 0,
            recent: VecDeque::with_capacity(PING_HISTORY_LEN),
        }
    }

    /// Inspect an inbound client ping received at `at` while the
    /// connection had `active_streams` open streams.
    pub fn on_ping(&mut self, active_streams: u32, at: Instant) -> PingVerdict {
        if self.recent.len() == PING_HISTORY_LEN {
            self.recent.pop_front();
        }
        self.recent.push_back(at);

        if active_streams == 0 && !self.config.permit_without_stream {
            tracing::info!("rejecting client ping on streamless connection");
            return PingVerdict::Reject(GoAwayReason::PingWithoutStream);
        }

        match self.last_tolerated {
            Some(last) if at.duration_since(last) < self.config.min_time => {
                self.strikes += 1;
                if self.strikes > MAX_PING_STRIKES {
                    tracing::info!(
                        strikes = self.strikes,
                        min_time_ms = self.config.min_time.as_millis() as u64,
                        recent_pings = self.recent.len(),
                        "client pinged too frequently, rejecting"
                    );
                    PingVerdict::Reject(GoAwayReason::TooManyPings)
                } else {
                    tracing::debug!(strikes = self.strikes, "early client ping, recording strike");
                    PingVerdict::Strike {
                        strikes: self.strikes,
                    }
                }
            }
            _ => {
                self.last_tolerated = Some(at);
                self.strikes = 0;
                PingVerdict::Tolerated
            }
        }
    }

    /// Current strike count (diagnostics).
    pub fn strikes(&self) -> u8 {
        self.strikes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine(min_time: Duration, permit: bool) -> EnforcementEngine {
        EnforcementEngine::new(
            EnforcementConfig::new()
                .with_min_time(min_time)
                .with_permit_without_stream(permit),
        )
    }

    #[test]
    fn first_ping_is_tolerated() {
        let mut engine = engine(Duration::from_secs(300), false);
        let verdict = engine.on_ping(1, Instant::now());
        assert_eq!(verdict, PingVerdict::Tolerated);
    }

    #[test]
    fn streamless_ping_rejected_outright() {
        let mut engine = engine(Duration::from_secs(300), false);
        let verdict = engine.on_ping(0, Instant::now());
        assert_eq!(verdict, PingVerdict::Reject(GoAwayReason::PingWithoutStream));
    }

    #[test]
    fn streamless_ping_permitted_when_configured() {
        let mut engine = engine(Duration::from_secs(300), true);
        let verdict = engine.on_ping(0, Instant::now());
        assert_eq!(verdict, PingVerdict::Tolerated);
    }

    #[test]
    fn early_pings_accrue_strikes_then_reject() {
        let mut engine = engine(Duration::from_secs(300), false);
        let start = Instant::now();

        assert_eq!(engine.on_ping(1, start), PingVerdict::Tolerated);
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(1)),
            PingVerdict::Strike { strikes: 1 }
        );
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(2)),
            PingVerdict::Strike { strikes: 2 }
        );
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(3)),
            PingVerdict::Reject(GoAwayReason::TooManyPings)
        );
    }

    #[test]
    fn well_spaced_ping_resets_strikes() {
        let mut engine = engine(Duration::from_secs(60), false);
        let start = Instant::now();

        assert_eq!(engine.on_ping(1, start), PingVerdict::Tolerated);
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(1)),
            PingVerdict::Strike { strikes: 1 }
        );

        // A compliant ping clears the slate.
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(61)),
            PingVerdict::Tolerated
        );
        assert_eq!(engine.strikes(), 0);
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(62)),
            PingVerdict::Strike { strikes: 1 }
        );
    }

    #[test]
    fn strike_window_runs_from_last_tolerated_ping() {
        let mut engine = engine(Duration::from_secs(60), false);
        let start = Instant::now();

        assert_eq!(engine.on_ping(1, start), PingVerdict::Tolerated);
        // Strikes do not move the tolerated timestamp, so a ping 61s
        // after the strike but 59s after the tolerated one still strikes.
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(30)),
            PingVerdict::Strike { strikes: 1 }
        );
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(59)),
            PingVerdict::Strike { strikes: 2 }
        );
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(61)),
            PingVerdict::Tolerated
        );
    }

    #[test]
    fn zero_min_time_uses_default() {
        let mut engine = engine(Duration::ZERO, false);
        let start = Instant::now();
        assert_eq!(engine.on_ping(1, start), PingVerdict::Tolerated);
        // Default is 5 minutes, so a 1s follow-up strikes.
        assert_eq!(
            engine.on_ping(1, start + Duration::from_secs(1)),
            PingVerdict::Strike { strikes: 1 }
        );
    }
}
