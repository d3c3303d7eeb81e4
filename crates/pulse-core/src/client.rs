//! Client-side keepalive driver.
//!
//! One task per connection: pings the server after `time` of inactivity
//! and closes the connection if no response arrives within `timeout`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::activity::ActivityTracker;
use crate::config::ClientConfig;
use crate::probe::Prober;
use crate::transport::{CloseReason, Transport};

/// Running keepalive driver for one connection side. Dropping the handle
/// does not stop the driver; call [`KeepaliveHandle::stop`] (or
/// [`KeepaliveHandle::stopped`]) when the connection goes away.
#[derive(Debug)]
pub struct KeepaliveHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl KeepaliveHandle {
    pub(crate) fn spawn<F>(future: impl FnOnce(watch::Receiver<bool>) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(future(shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Stop the driver, cancelling all pending timers. Idempotent. This
    /// is also the right call when the transport reports the connection
    /// closed externally.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the driver and wait for its task to finish.
    pub async fn stopped(self) {
        self.stop();
        let _ = self.task.await;
    }

    /// Whether the driver task has exited (stopped, or the connection
    /// was condemned).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the client keepalive driver for one connection.
///
/// `config.time` below the 10s floor is clamped here; the config is
/// immutable afterwards. The caller keeps feeding inbound events into
/// `tracker`.
pub fn start_client_keepalive<T: Transport>(
    config: ClientConfig,
    transport: Arc<T>,
    tracker: Arc<ActivityTracker>,
) -> KeepaliveHandle {
    let config = config.normalized();
    KeepaliveHandle::spawn(move |shutdown_rx| run(config, transport, tracker, shutdown_rx))
}

async fn run<T: Transport>(
    config: ClientConfig,
    transport: Arc<T>,
    tracker: Arc<ActivityTracker>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut events = tracker.subscribe();
    let mut prober = Prober::new(config.time, config.timeout, !config.permit_without_stream);
    prober.start(&tracker.snapshot());

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("client keepalive stopped");
                break;
            }
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
                prober.on_activity(&tracker.snapshot());
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
                if let Err(e) = transport.close(CloseReason::KeepaliveTimeout).await {
                    tracing::warn!(error = %e, "failed to close timed-out connection");
                }
                break;
            }
        }
    }
}
