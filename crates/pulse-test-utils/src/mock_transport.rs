//! Mock transport for testing keepalive drivers without real network.
//!
//! Records every operation a driver invokes and forwards it on a channel
//! so tests can await "the next thing the driver did" under a paused
//! tokio clock.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use pulse_core::error::Result;
use pulse_core::{CloseReason, GoAwayReason, Transport};

/// One operation a driver asked the transport to perform, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    Ping,
    GoAway(GoAwayReason),
    Close(CloseReason),
}

/// In-memory transport that records driver actions.
#[derive(Debug)]
pub struct MockTransport {
    ops: Mutex<Vec<TransportOp>>,
    op_tx: mpsc::UnboundedSender<TransportOp>,
    /// Simulated dispatch time for pings: `send_ping` records the op
    /// immediately but stays in flight for this long.
    ping_delay: Option<Duration>,
}

impl MockTransport {
    /// Create a mock transport and the receiver on which its recorded
    /// operations arrive in order.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportOp>) {
        Self::build(None)
    }

    /// Like [`MockTransport::new`], but every ping send stays in flight
    /// for `delay` before completing.
    pub fn with_ping_delay(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportOp>) {
        Self::build(Some(delay))
    }

    fn build(ping_delay: Option<Duration>) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportOp>) {
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                ops: Mutex::new(Vec::new()),
                op_tx,
                ping_delay,
            }),
            op_rx,
        )
    }

    /// All operations recorded so far, in order.
    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().expect("mock transport poisoned").clone()
    }

    /// Number of pings the driver has sent.
    pub fn ping_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, TransportOp::Ping))
            .count()
    }

    fn record(&self, op: TransportOp) {
        self.ops.lock().expect("mock transport poisoned").push(op);
        let _ = self.op_tx.send(op);
    }
}

impl Transport for MockTransport {
    async fn send_ping(&self) -> Result<()> {
        self.record(TransportOp::Ping);
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn send_go_away(&self, reason: GoAwayReason) -> Result<()> {
        self.record(TransportOp::GoAway(reason));
        Ok(())
    }

    async fn close(&self, reason: CloseReason) -> Result<()> {
        self.record(TransportOp::Close(reason));
        Ok(())
    }
}
