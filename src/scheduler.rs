//! Periodic refresh driver.
//!
//! The ticker task waits for either the next tick or a stop signal. Once a
//! refresh cycle has started it runs to completion, so disabling never
//! cancels an in-flight fetch and one ticker never overlaps its own cycles.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::model::FleetModel;

/// Shortest accepted refresh period; `tokio::time::interval` rejects zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct RefreshScheduler {
    model: Weak<FleetModel>,
    interval: Duration,
    latest_point: bool,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    enabled: watch::Sender<bool>,
}

impl RefreshScheduler {
    /// Creates a disabled scheduler for `model`. A zero `interval` is raised
    /// to [`MIN_INTERVAL`].
    pub fn new(model: &Arc<FleetModel>, interval: Duration) -> Self {
        let (enabled, _) = watch::channel(false);
        Self {
            model: Arc::downgrade(model),
            interval: interval.max(MIN_INTERVAL),
            latest_point: true,
            stop: Mutex::new(None),
            enabled,
        }
    }

    pub fn with_latest_point(mut self, latest_point: bool) -> Self {
        self.latest_point = latest_point;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn subscribe_enabled(&self) -> watch::Receiver<bool> {
        self.enabled.subscribe()
    }

    /// Starts refreshing every interval, first tick one interval from now.
    /// Any existing timer is stopped first.
    pub fn enable(&self) {
        let mut slot = self.lock_stop();
        if let Some(previous) = slot.take() {
            tracing::debug!("replacing existing refresh timer");
            // The task may already have exited if the model was dropped.
            let _ = previous.send(());
        }

        let (stop, stopped) = oneshot::channel();
        tokio::spawn(run_ticker(
            self.model.clone(),
            self.interval,
            self.latest_point,
            stopped,
        ));
        *slot = Some(stop);
        self.enabled.send_replace(true);
        tracing::info!(interval_secs = self.interval.as_secs(), "auto refresh enabled");
    }

    /// Stops future ticks. A refresh already running completes normally.
    pub fn disable(&self) {
        if let Some(stop) = self.lock_stop().take() {
            let _ = stop.send(());
            tracing::info!("auto refresh disabled");
        }
        self.enabled.send_replace(false);
    }

    fn lock_stop(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<()>>> {
        match self.stop.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.disable();
    }
}

async fn run_ticker(
    model: Weak<FleetModel>,
    period: Duration,
    latest_point: bool,
    mut stopped: oneshot::Receiver<()>,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = interval.tick() => {
                let Some(model) = model.upgrade() else {
                    tracing::debug!("model dropped, stopping refresh timer");
                    break;
                };
                tracing::debug!("refresh tick");
                model.load_devices(latest_point).await;
            }
        }
    }
}
