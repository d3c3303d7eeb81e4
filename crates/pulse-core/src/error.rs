//! Error types for pulse-core.
//!
//! Every error here is local to one connection. Nothing in this taxonomy
//! propagates across connections or should take a process down; the
//! closest thing to a fatal condition is [`Error::InvariantViolation`],
//! which indicates a contract bug in the calling transport layer.

use thiserror::Error;

/// Main error type for keepalive operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A probe went unanswered within the configured timeout; the
    /// connection was closed locally.
    #[error("keepalive timeout: ping unanswered")]
    LivenessTimeout,

    /// The peer violated the server's keepalive enforcement policy.
    #[error("keepalive policy violation: {reason}")]
    PolicyViolation { reason: String },

    /// A collaborator broke a contract this subsystem relies on, e.g.
    /// closing a stream that was never opened.
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// The connection is already gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport-level failure while dispatching a ping, GoAway, or close.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl Error {
    /// Returns true if this error means the peer (not us) misbehaved.
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, Error::PolicyViolation { .. })
    }

    /// Returns true if this error indicates a programming bug in a
    /// collaborator rather than a runtime condition.
    pub fn is_contract_bug(&self) -> bool {
        matches!(self, Error::InvariantViolation { .. })
    }
}

/// Convenience result type for keepalive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_liveness_timeout() {
        assert_eq!(
            Error::LivenessTimeout.to_string(),
            "keepalive timeout: ping unanswered"
        );
    }

    #[test]
    fn error_display_policy_violation() {
        let err = Error::PolicyViolation {
            reason: "too_many_pings".into(),
        };
        assert_eq!(err.to_string(), "keepalive policy violation: too_many_pings");
    }

    #[test]
    fn error_display_transport() {
        let err = Error::Transport {
            message: "ping send failed".into(),
        };
        assert_eq!(err.to_string(), "transport error: ping send failed");
    }

    #[test]
    fn error_classification() {
        assert!(Error::PolicyViolation {
            reason: "too_many_pings".into()
        }
        .is_peer_fault());
        assert!(!Error::LivenessTimeout.is_peer_fault());

        assert!(Error::InvariantViolation {
            message: "stream count underflow".into()
        }
        .is_contract_bug());
        assert!(!Error::ConnectionClosed.is_contract_bug());
    }
}
