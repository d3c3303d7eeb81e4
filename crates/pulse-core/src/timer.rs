//! One-shot, re-armable timer used by the keepalive drivers.
//!
//! A [`Timer`] is owned by a single driver loop and polled through
//! [`Timer::fired`] inside `tokio::select!`. Cancellation is best-effort:
//! `stop()` prevents future fires, but a fire that the owning select loop
//! has already been woken for may still be observed. Every consumer
//! therefore re-validates tracker state after waking rather than trusting
//! the timer alone.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep_until, Instant, Sleep};

/// A cancellable, resettable one-shot deadline.
#[derive(Debug)]
pub struct Timer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Timer {
    /// Create a stopped timer. [`Timer::fired`] pends forever until the
    /// timer is armed.
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now())),
            armed: false,
        }
    }

    /// Arm (or re-arm) the timer to fire after `after`, discarding any
    /// pending fire.
    pub fn arm(&mut self, after: Duration) {
        self.arm_at(Instant::now() + after);
    }

    /// Arm (or re-arm) the timer to fire at `deadline`. A deadline in the
    /// past fires on the next poll.
    pub fn arm_at(&mut self, deadline: Instant) {
        self.sleep.as_mut().reset(deadline);
        self.armed = true;
    }

    /// Cancel any pending fire. No-op if already fired or stopped.
    pub fn stop(&mut self) {
        self.armed = false;
    }

    /// Whether the timer is armed and has not yet delivered its fire.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Resolves when the armed deadline passes; pends forever while
    /// stopped. Each arm delivers at most one fire. Cancel-safe: losing a
    /// `select!` race leaves the deadline and armed state intact.
    pub async fn fired(&mut self) {
        if !self.armed {
            std::future::pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    #[tokio::test(start_paused = true)]
    async fn fires_after_armed_duration() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_secs(3));

        let start = Instant::now();
        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_fires() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_secs(1));
        timer.stop();

        advance(Duration::from_secs(10)).await;
        let fired = timeout(Duration::from_secs(1), timer.fired()).await;
        assert!(fired.is_err(), "stopped timer fired");
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_discards_pending_fire() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_secs(1));
        // Reschedule as if freshly armed.
        timer.arm(Duration::from_secs(5));

        let start = Instant::now();
        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_timer_pends() {
        let mut timer = Timer::new();
        let fired = timeout(Duration::from_secs(60), timer.fired()).await;
        assert!(fired.is_err(), "unarmed timer fired");
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_arm() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_secs(1));
        timer.fired().await;

        // Second wait pends until re-armed.
        let second = timeout(Duration::from_secs(60), timer.fired()).await;
        assert!(second.is_err());

        timer.arm(Duration::from_secs(2));
        let start = Instant::now();
        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let mut timer = Timer::new();
        timer.stop();
        timer.arm(Duration::from_secs(1));
        timer.fired().await;
        timer.stop();
        timer.stop();
        assert!(!timer.is_armed());
    }
}
