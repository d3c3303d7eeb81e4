//! pulse-test-utils: Test infrastructure for pulse-core.
//!
//! Provides:
//! - MockTransport: records keepalive driver actions without a network

mod mock_transport;

pub use mock_transport::{MockTransport, TransportOp};
