//! Transport abstraction consumed by the keepalive drivers.
//!
//! The drivers only ever decide *when* to act; the wire framing lives
//! behind this trait. Real connections implement it over their control
//! stream; tests use the in-memory mock from `pulse-test-utils`.

use std::fmt;
use std::future::Future;

use crate::error::Result;

/// Why a GoAway is being sent. The wire debug data is the `Display`
/// rendering, so the peer sees a human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoAwayReason {
    /// The connection sat with no open streams past `max_connection_idle`.
    Idle,
    /// The connection outlived its (jittered) `max_connection_age`.
    MaxAge,
    /// The client pinged more often than the enforcement policy permits.
    TooManyPings,
    /// The client pinged a streamless connection and the policy forbids it.
    PingWithoutStream,
}

impl fmt::Display for GoAwayReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoAwayReason::Idle => write!(f, "max_idle"),
            GoAwayReason::MaxAge => write!(f, "max_age"),
            GoAwayReason::TooManyPings => write!(f, "too_many_pings"),
            GoAwayReason::PingWithoutStream => write!(f, "ping_without_stream"),
        }
    }
}

/// Why a connection is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// A keepalive probe went unanswered within the configured timeout.
    KeepaliveTimeout,
    /// Graceful close after an idle-timeout GoAway.
    Idle,
    /// The max-age grace period expired with streams still in flight.
    MaxAgeGraceExpired,
    /// The peer violated the keepalive enforcement policy.
    PolicyViolation,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::KeepaliveTimeout => write!(f, "keepalive timeout"),
            CloseReason::Idle => write!(f, "connection idle"),
            CloseReason::MaxAgeGraceExpired => write!(f, "max-age grace expired"),
            CloseReason::PolicyViolation => write!(f, "keepalive policy violation"),
        }
    }
}

/// Canonical mapping from a close reason to the error a caller observes
/// when asking why its connection went away.
impl From<CloseReason> for crate::error::Error {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::KeepaliveTimeout => crate::error::Error::LivenessTimeout,
            CloseReason::PolicyViolation => crate::error::Error::PolicyViolation {
                reason: reason.to_string(),
            },
            CloseReason::Idle | CloseReason::MaxAgeGraceExpired => {
                crate::error::Error::ConnectionClosed
            }
        }
    }
}

/// Operations the keepalive drivers invoke on the owning connection.
///
/// Implementations dispatch asynchronously and must not call back into
/// the [`ActivityTracker`](crate::ActivityTracker) while holding locks of
/// their own; the drivers never hold tracker state across these calls.
pub trait Transport: Send + Sync + 'static {
    /// Send a keepalive ping frame to the peer.
    fn send_ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Tell the peer no new work will be accepted on this connection.
    fn send_go_away(&self, reason: GoAwayReason) -> impl Future<Output = Result<()>> + Send;

    /// Tear the connection down.
    fn close(&self, reason: CloseReason) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goaway_reason_strings() {
        assert_eq!(GoAwayReason::TooManyPings.to_string(), "too_many_pings");
        assert_eq!(GoAwayReason::Idle.to_string(), "max_idle");
        assert_eq!(
            GoAwayReason::PingWithoutStream.to_string(),
            "ping_without_stream"
        );
    }

    #[test]
    fn close_reason_maps_to_error_taxonomy() {
        use crate::error::Error;

        assert!(matches!(
            Error::from(CloseReason::KeepaliveTimeout),
            Error::LivenessTimeout
        ));
        assert!(matches!(
            Error::from(CloseReason::PolicyViolation),
            Error::PolicyViolation { .. }
        ));
        assert!(matches!(
            Error::from(CloseReason::Idle),
            Error::ConnectionClosed
        ));
    }

    #[test]
    fn close_reason_strings() {
        assert_eq!(CloseReason::KeepaliveTimeout.to_string(), "keepalive timeout");
        assert_eq!(
            CloseReason::MaxAgeGraceExpired.to_string(),
            "max-age grace expired"
        );
    }
}
