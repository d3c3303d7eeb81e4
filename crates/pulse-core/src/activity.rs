//! Per-connection activity tracking shared by the keepalive drivers.
//!
//! One [`ActivityTracker`] exists per connection. Transport callbacks
//! (frame received, stream opened/closed, ping ack) and the driver tasks
//! all read and write it; mutations are serialized under one short-held
//! mutex that is never held across an await. Every mutation bumps a watch
//! epoch so blocked drivers wake and re-evaluate their deadlines.

use std::sync::Mutex;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

#[derive(Debug)]
struct ActivityInner {
    /// Instant of the most recent inbound frame.
    last_activity: Instant,
    /// Open streams. Never goes below zero; an underflow is a contract
    /// bug in the caller.
    active_streams: u32,
    /// Pings sent but not yet acknowledged.
    outstanding_pings: u32,
    /// Set while the connection has no open streams; the server idle
    /// timer runs from this instant.
    idle_since: Option<Instant>,
}

/// Consistent point-in-time view of a connection's activity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    /// Instant of the most recent inbound frame.
    pub last_activity: Instant,
    /// Open streams.
    pub active_streams: u32,
    /// Pings sent but not yet acknowledged.
    pub outstanding_pings: u32,
    /// Start of the current streamless period, if any.
    pub idle_since: Option<Instant>,
    /// When the connection was established.
    pub established_at: Instant,
}

/// Shared activity state for one connection.
#[derive(Debug)]
pub struct ActivityTracker {
    inner: Mutex<ActivityInner>,
    established_at: Instant,
    epoch_tx: watch::Sender<u64>,
}

impl ActivityTracker {
    /// Create a tracker for a freshly established connection. The
    /// connection starts streamless, so the idle clock runs from now.
    pub fn new() -> Self {
        let now = Instant::now();
        let (epoch_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(ActivityInner {
                last_activity: now,
                active_streams: 0,
                outstanding_pings: 0,
                idle_since: Some(now),
            }),
            established_at: now,
            epoch_tx,
        }
    }

    /// Record an inbound frame of any kind.
    pub fn record_activity(&self) {
        self.mutate(|inner| inner.last_activity = Instant::now());
    }

    /// Record a ping acknowledgement from the peer. Counts as activity
    /// and settles one outstanding probe.
    pub fn ping_ack_received(&self) {
        self.mutate(|inner| {
            inner.last_activity = Instant::now();
            if inner.outstanding_pings == 0 {
                tracing::debug!("ping ack with no outstanding ping, ignoring count");
            } else {
                inner.outstanding_pings -= 1;
            }
        });
    }

    /// Record that a driver sent a probe.
    pub fn ping_sent(&self) {
        self.mutate(|inner| inner.outstanding_pings += 1);
    }

    /// Record a stream opening. Also counts as activity.
    pub fn stream_opened(&self) {
        self.mutate(|inner| {
            inner.active_streams += 1;
            inner.idle_since = None;
            inner.last_activity = Instant::now();
        });
    }

    /// Record a stream closing. When the last stream closes, the idle
    /// clock starts. Closing a stream that was never opened is a
    /// contract bug in the transport layer and is reported, not clamped.
    pub fn stream_closed(&self) -> Result<()> {
        let result = self.mutate(|inner| {
            if inner.active_streams == 0 {
                return Err(Error::InvariantViolation {
                    message: "stream closed with zero active streams".into(),
                });
            }
            inner.active_streams -= 1;
            if inner.active_streams == 0 {
                inner.idle_since = Some(Instant::now());
            }
            Ok(())
        });
        if let Err(ref e) = result {
            tracing::error!(error = %e, "activity tracker invariant violated");
        }
        result
    }

    /// Consistent read of all counters.
    pub fn snapshot(&self) -> ActivitySnapshot {
        let inner = self.inner.lock().expect("activity tracker poisoned");
        ActivitySnapshot {
            last_activity: inner.last_activity,
            active_streams: inner.active_streams,
            outstanding_pings: inner.outstanding_pings,
            idle_since: inner.idle_since,
            established_at: self.established_at,
        }
    }

    /// When the connection was established.
    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// Subscribe to mutation notifications. Receivers see a change after
    /// every tracker mutation (coalesced under load, which is fine: the
    /// drivers re-read a full snapshot on every wake).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ActivityInner) -> R) -> R {
        let result = {
            let mut inner = self.inner.lock().expect("activity tracker poisoned");
            f(&mut inner)
        };
        // Wake drivers outside the lock.
        self.epoch_tx.send_modify(|epoch| *epoch += 1);
        result
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_counting() {
        let tracker = ActivityTracker::new();
        assert_eq!(tracker.snapshot().active_streams, 0);
        assert!(tracker.snapshot().idle_since.is_some());
        assert_eq!(tracker.snapshot().established_at, tracker.established_at());

        tracker.stream_opened();
        tracker.stream_opened();
        let snap = tracker.snapshot();
        assert_eq!(snap.active_streams, 2);
        assert!(snap.idle_since.is_none());

        tracker.stream_closed().unwrap();
        assert!(tracker.snapshot().idle_since.is_none());
        tracker.stream_closed().unwrap();
        assert!(tracker.snapshot().idle_since.is_some());
    }

    #[tokio::test]
    async fn stream_close_underflow_is_invariant_violation() {
        let tracker = ActivityTracker::new();
        let err = tracker.stream_closed().unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));
        // The count is untouched, not wrapped.
        assert_eq!(tracker.snapshot().active_streams, 0);
    }

    #[tokio::test]
    async fn ping_accounting() {
        let tracker = ActivityTracker::new();
        tracker.ping_sent();
        tracker.ping_sent();
        assert_eq!(tracker.snapshot().outstanding_pings, 2);

        tracker.ping_ack_received();
        assert_eq!(tracker.snapshot().outstanding_pings, 1);

        // Unmatched acks are ignored rather than underflowing.
        tracker.ping_ack_received();
        tracker.ping_ack_received();
        assert_eq!(tracker.snapshot().outstanding_pings, 0);
    }

    #[tokio::test]
    async fn mutations_bump_epoch() {
        let tracker = ActivityTracker::new();
        let rx = tracker.subscribe();
        let before = *rx.borrow();

        tracker.record_activity();
        tracker.stream_opened();
        assert_eq!(*rx.borrow(), before + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_moves_last_activity_forward() {
        let tracker = ActivityTracker::new();
        let first = tracker.snapshot().last_activity;

        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        tracker.record_activity();
        assert!(tracker.snapshot().last_activity > first);
    }
}
