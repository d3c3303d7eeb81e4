//! Shared ping/timeout probe loop used by both keepalive drivers.
//!
//! The client and server sides run the same state machine: an inactivity
//! timer that triggers a probe, and a watchdog that condemns the
//! connection if the probe goes unanswered. Only the floors and the
//! streamless gating differ, so the machinery lives here and the drivers
//! wire its timers into their select loops.

use std::time::Duration;

use tokio::time::Instant;

use crate::activity::ActivitySnapshot;
use crate::timer::Timer;

/// Probe-side driver state. `Closing` is represented by the driver loop
/// exiting after instructing the transport to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeState {
    Idle,
    Outstanding { sent_at: Instant },
}

/// One side's probe state machine plus its two timers. The timers are
/// public so the owning select loop can await them as disjoint borrows.
#[derive(Debug)]
pub(crate) struct Prober {
    /// `None` disables probing entirely. Already clamped to the side's
    /// floor by config normalization.
    interval: Option<Duration>,
    timeout: Duration,
    /// Client side with `permit_without_stream == false`: stay dormant
    /// while the connection has no streams.
    require_stream: bool,
    state: ProbeState,
    pub interval_timer: Timer,
    pub watchdog: Timer,
}

impl Prober {
    pub fn new(interval: Option<Duration>, timeout: Duration, require_stream: bool) -> Self {
        Self {
            interval,
            timeout,
            require_stream,
            state: ProbeState::Idle,
            interval_timer: Timer::new(),
            watchdog: Timer::new(),
        }
    }

    /// Arm the inactivity timer from the connection's current state.
    pub fn start(&mut self, snap: &ActivitySnapshot) {
        if let Some(interval) = self.interval {
            self.interval_timer.arm_at(snap.last_activity + interval);
        }
    }

    /// React to any tracker mutation. In `Idle` the inactivity clock
    /// follows the latest activity; in `Outstanding`, any inbound
    /// activity at or after the probe settles it and returns to `Idle`.
    pub fn on_activity(&mut self, snap: &ActivitySnapshot) {
        match self.state {
            ProbeState::Idle => self.start(snap),
            ProbeState::Outstanding { sent_at } => {
                if snap.last_activity >= sent_at {
                    self.watchdog.stop();
                    self.state = ProbeState::Idle;
                    self.start(snap);
                }
            }
        }
    }

    /// Decide what to do when the inactivity timer fires. Returns true
    /// when the caller should send a probe now (and then call
    /// [`Prober::ping_sent`]); otherwise the timer has been re-armed and
    /// the state stays `Idle`.
    pub fn on_interval_fired(&mut self, snap: &ActivitySnapshot) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        if self.state != ProbeState::Idle {
            return false;
        }
        let deadline = snap.last_activity + interval;
        if Instant::now() < deadline {
            // Activity raced the fire; push the deadline out.
            self.interval_timer.arm_at(deadline);
            return false;
        }
        if self.require_stream && snap.active_streams == 0 {
            // Streamless and not permitted to probe: stay dormant.
            self.interval_timer.arm(interval);
            return false;
        }
        true
    }

    /// Re-validate after a watchdog wake: activity may have raced the
    /// fire through the select loop. Returns true when the probe is
    /// genuinely unanswered and the connection should be condemned.
    pub fn watchdog_expired(&mut self, snap: &ActivitySnapshot) -> bool {
        self.on_activity(snap);
        matches!(self.state, ProbeState::Outstanding { .. })
    }

    /// Record that the probe went out: arm the watchdog and hold the
    /// inactivity timer until the probe settles.
    pub fn ping_sent(&mut self) {
        self.state = ProbeState::Outstanding {
            sent_at: Instant::now(),
        };
        self.watchdog.arm(self.timeout);
        self.interval_timer.stop();
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
