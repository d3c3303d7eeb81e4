//! Server-side keepalive and connection-lifecycle driver.
//!
//! One task per connection running four concerns against the shared
//! activity tracker:
//! - idle timer: GoAway + close after `max_connection_idle` without streams
//! - age timer: GoAway at the jittered `max_connection_age`, then a grace
//!   timer that force-closes stragglers
//! - probe loop: same shape as the client side, 1s floor, no stream gating
//! - enforcement: gate inbound client pings against the abuse policy

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::activity::ActivityTracker;
use crate::client::KeepaliveHandle;
use crate::config::{jittered, EnforcementConfig, ServerConfig};
use crate::enforcement::{EnforcementEngine, PingVerdict};
use crate::probe::Prober;
use crate::timer::Timer;
use crate::transport::{CloseReason, GoAwayReason, Transport};

/// Running server-side driver for one connection.
#[derive(Debug)]
pub struct ServerKeepaliveHandle {
    handle: KeepaliveHandle,
    ping_tx: mpsc::UnboundedSender<Instant>,
    tracker: Arc<ActivityTracker>,
}

impl ServerKeepaliveHandle {
    /// Feed an inbound client-initiated ping to the enforcement engine.
    /// The ping also counts as connection activity. If it violates the
    /// policy, the driver sends a GoAway and closes the connection.
    pub fn client_ping(&self) {
        self.tracker.record_activity();
        let _ = self.ping_tx.send(Instant::now());
    }

    /// Stop the driver, cancelling all pending timers. Idempotent.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Stop the driver and wait for its task to finish.
    pub async fn stopped(self) {
        self.handle.stopped().await;
    }

    /// Whether the driver task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Start the server keepalive driver for one connection.
///
/// The max-age jitter is drawn here, once, and fixed as a deadline for
/// the connection's lifetime. `config.time` below the 1s floor is
/// clamped; a zero enforcement `min_time` means the 5 minute default.
pub fn start_server_keepalive<T: Transport>(
    config: ServerConfig,
    enforcement: EnforcementConfig,
    transport: Arc<T>,
    tracker: Arc<ActivityTracker>,
) -> ServerKeepaliveHandle {
    let config = config.normalized();
    let (ping_tx, ping_rx) = mpsc::unbounded_channel();
    let run_tracker = tracker.clone();
    let handle = KeepaliveHandle::spawn(move |shutdown_rx| {
        run(config, enforcement, transport, run_tracker, ping_rx, shutdown_rx)
    });
    ServerKeepaliveHandle {
        handle,
        ping_tx,
        tracker,
    }
}

async fn run<T: Transport>(
    config: ServerConfig,
    enforcement: EnforcementConfig,
    transport: Arc<T>,
    tracker: Arc<ActivityTracker>,
    mut ping_rx: mpsc::UnboundedReceiver<Instant>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut events = tracker.subscribe();
    let mut engine = EnforcementEngine::new(enforcement);
    let snap = tracker.snapshot();

    let mut prober = Prober::new(config.time, config.timeout, false);
    prober.start(&snap);

    let max_idle = config.max_connection_idle;
    let mut idle_timer = Timer::new();
    if let (Some(idle), Some(since)) = (max_idle, snap.idle_since) {
        idle_timer.arm_at(since + idle);
    }

    // Jitter is drawn once; the deadline is fixed for the connection.
    let mut age_timer = Timer::new();
    if let Some(age) = config.max_connection_age {
        let effective = jittered(age);
        tracing::debug!(
            configured_ms = age.as_millis() as u64,
            effective_ms = effective.as_millis() as u64,
            "max-age deadline set"
        );
        age_timer.arm_at(snap.established_at + effective);
    }
    let mut grace_timer = Timer::new();

    let mut goaway_sent = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("server keepalive stopped");
                break;
            }
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = tracker.snapshot();
                prober.on_activity(&snap);
                if let Some(idle) = max_idle {
                    match snap.idle_since {
                        Some(since) if !idle_timer.is_armed() => idle_timer.arm_at(since + idle),
                        Some(_) => {}
                        None => idle_timer.stop(),
                    }
                }
            }
            Some(at) = ping_rx.recv() => {
                let snap = tracker.snapshot();
                match engine.on_ping(snap.active_streams, at) {
                    PingVerdict::Tolerated | PingVerdict::Strike { .. } => {}
                    PingVerdict::Reject(reason) => {
                        go_away_once(&*transport, &mut goaway_sent, reason).await;
                        close(&*transport, CloseReason::PolicyViolation).await;
                        break;
                    }
                }
            }
            _ = idle_timer.fired() => {
                let snap = tracker.snapshot();
                let Some(idle) = max_idle else { continue };
                match snap.idle_since {
                    Some(since) if Instant::now() >= since + idle => {
                        tracing::info!(
                            idle_ms = idle.as_millis() as u64,
                            "connection idle too long, closing"
                        );
                        go_away_once(&*transport, &mut goaway_sent, GoAwayReason::Idle).await;
                        close(&*transport, CloseReason::Idle).await;
                        break;
                    }
                    // Streams closed again since the fire was scheduled;
                    // the idle clock restarted.
                    Some(since) => idle_timer.arm_at(since + idle),
                    // A stream became active; re-armed on the next
                    // idle transition.
                    None => {}
                }
            }
            _ = age_timer.fired() => {
                go_away_once(&*transport, &mut goaway_sent, GoAwayReason::MaxAge).await;
                match config.max_connection_age_grace {
                    Some(grace) => {
                        tracing::info!(
                            grace_ms = grace.as_millis() as u64,
                            "max connection age reached, grace period started"
                        );
                        grace_timer.arm(grace);
                    }
                    None => {
                        tracing::info!(
                            "max connection age reached, waiting for streams to finish"
                        );
                    }
                }
            }
            _ = grace_timer.fired() => {
                tracing::info!("max-age grace period expired, force closing");
                close(&*transport, CloseReason::MaxAgeGraceExpired).await;
                break;
            }
            _ = prober.interval_timer.fired() => {
                let snap = tracker.snapshot();
                if prober.on_interval_fired(&snap) {
                    // Stamp before dispatching so an ack that lands while
                    // the send is in flight is not misread as stale.
                    tracker.ping_sent();
                    prober.ping_sent();
                    if let Err(e) = transport.send_ping().await {
                        tracing::warn!(error = %e, "failed to send keepalive ping");
                    }
                    tracing::debug!("keepalive ping sent");
                }
            }
            _ = prober.watchdog.fired() => {
                if !prober.watchdog_expired(&tracker.snapshot()) {
                    continue;
                }
                tracing::info!(
                    timeout_ms = prober.timeout().as_millis() as u64,
                    "keepalive probe unanswered, closing connection"
                );
                close(&*transport, CloseReason::KeepaliveTimeout).await;
                break;
            }
        }
    }
}

/// Send a GoAway unless one already went out. At most one GoAway leaves
/// per connection; a timer firing after another path's GoAway skips the
/// send but still runs its own follow-up (grace arming, close).
async fn go_away_once<T: Transport>(transport: &T, sent: &mut bool, reason: GoAwayReason) {
    if *sent {
        tracing::debug!(%reason, "GoAway already sent, skipping");
        return;
    }
    *sent = true;
    tracing::info!(%reason, "sending GoAway");
    if let Err(e) = transport.send_go_away(reason).await {
        tracing::warn!(error = %e, %reason, "failed to send GoAway");
    }
}

async fn close<T: Transport>(transport: &T, reason: CloseReason) {
    if let Err(e) = transport.close(reason).await {
        tracing::warn!(error = %e, %reason, "failed to close connection");
    }
}
