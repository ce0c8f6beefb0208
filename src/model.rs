//! Owner of the shared device list and error message.
//!
//! Observers subscribe through `tokio::sync::watch` receivers. The model is
//! the only writer of both values.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::client::DeviceSource;
use crate::types::DeviceRecord;

pub type SharedDevices = Arc<Vec<DeviceRecord>>;

pub struct FleetModel {
    source: Arc<dyn DeviceSource>,
    devices: watch::Sender<SharedDevices>,
    error: watch::Sender<Option<String>>,
    error_generation: AtomicU64,
    error_clear_delay: Duration,
    loading: AtomicBool,
}

/// Clears the loading flag on every exit path.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FleetModel {
    pub fn new(source: Arc<dyn DeviceSource>, error_clear_delay: Duration) -> Arc<Self> {
        let (devices, _) = watch::channel(Arc::new(Vec::new()));
        let (error, _) = watch::channel(None);
        Arc::new(Self {
            source,
            devices,
            error,
            error_generation: AtomicU64::new(0),
            error_clear_delay,
            loading: AtomicBool::new(false),
        })
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<SharedDevices> {
        self.devices.subscribe()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    /// Snapshot of the current device list.
    pub fn devices(&self) -> SharedDevices {
        self.devices.borrow().clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Fetches devices and publishes the outcome.
    ///
    /// A load already in progress makes this a no-op. On failure the previous
    /// list is kept and an error message is shown until it auto-clears.
    pub async fn load_devices(self: &Arc<Self>, latest_point: bool) {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("load already in progress, skipping");
            return;
        }
        let _loading = LoadingGuard(&self.loading);

        match self.source.fetch_devices(latest_point).await {
            Ok(fetched) => {
                tracing::info!(count = fetched.len(), "device list replaced");
                self.devices.send_replace(Arc::new(fetched));
                self.error_generation.fetch_add(1, Ordering::AcqRel);
                self.error.send_if_modified(|current| current.take().is_some());
            }
            Err(e) => {
                tracing::warn!(error = %e, "device refresh failed, keeping last list");
                self.show_error(e.to_string());
            }
        }
    }

    fn show_error(self: &Arc<Self>, message: String) {
        let generation = self.error_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.error.send_replace(Some(message));

        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.error_clear_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(model) = weak.upgrade() {
                model.clear_error_if_current(generation);
            }
        });
    }

    // A newer message or a success in between bumps the generation.
    fn clear_error_if_current(&self, generation: u64) {
        if self.error_generation.load(Ordering::Acquire) == generation {
            self.error.send_if_modified(|current| current.take().is_some());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockDeviceSource;
    use crate::error::{FetchError, FetchResult};
    use crate::status::tests::device;
    use std::collections::VecDeque;

    /// Source that replays `outcomes` in order, one per call.
    fn scripted(outcomes: Vec<FetchResult<Vec<DeviceRecord>>>) -> Arc<MockDeviceSource> {
        let calls = outcomes.len();
        let mut queue = VecDeque::from(outcomes);
        let mut source = MockDeviceSource::new();
        source
            .expect_fetch_devices()
            .times(calls)
            .returning(move |_| queue.pop_front().unwrap());
        Arc::new(source)
    }

    fn named(id: &str) -> DeviceRecord {
        let mut record = device(true, Some("idle"), 0.0);
        record.device_id = id.to_string();
        record
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_replaces_list_and_clears_error() {
        let source = scripted(vec![Err(FetchError::MaxRetryExceeded), Ok(vec![named("x")])]);
        let model = FleetModel::new(source, Duration::from_secs(3));

        model.load_devices(true).await;
        assert!(model.error_message().is_some());

        model.load_devices(true).await;
        assert_eq!(model.devices().len(), 1);
        assert_eq!(model.devices()[0].device_id, "x");
        assert!(model.error_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_good_list() {
        let source = scripted(vec![Ok(vec![named("a"), named("b")]), Err(FetchError::MaxRetryExceeded)]);
        let model = FleetModel::new(source, Duration::from_secs(3));

        model.load_devices(true).await;
        model.load_devices(false).await;

        assert_eq!(model.devices().len(), 2);
        assert_eq!(
            model.error_message().as_deref(),
            Some("Maximum retry attempts exceeded.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_auto_clears() {
        let mut source = MockDeviceSource::new();
        source
            .expect_fetch_devices()
            .returning(|_| Err(FetchError::RequestThrottled));
        let model = FleetModel::new(Arc::new(source), Duration::from_secs(3));
        let mut errors = model.subscribe_error();

        model.load_devices(true).await;
        assert_eq!(
            errors.borrow_and_update().as_deref(),
            Some("Request is throttled. Please try again later.")
        );

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(model.error_message().is_some());

        errors.changed().await.unwrap();
        assert!(errors.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_clear_keeps_newer_error() {
        let mut source = MockDeviceSource::new();
        source
            .expect_fetch_devices()
            .returning(|_| Err(FetchError::MaxRetryExceeded));
        let model = FleetModel::new(Arc::new(source), Duration::from_secs(3));

        model.load_devices(true).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        model.load_devices(true).await;

        // First message's timer fires at 3s; the second one is still current.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(model.error_message().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(model.error_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_see_new_list() {
        let mut source = MockDeviceSource::new();
        source
            .expect_fetch_devices()
            .withf(|latest| *latest)
            .returning(|_| Ok(vec![named("a")]));
        let model = FleetModel::new(Arc::new(source), Duration::from_secs(3));
        let mut devices = model.subscribe_devices();
        assert!(devices.borrow_and_update().is_empty());

        model.load_devices(true).await;

        assert!(devices.has_changed().unwrap());
        assert_eq!(devices.borrow_and_update()[0].device_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_load_is_skipped() {
        let model = FleetModel::new(scripted(vec![Ok(vec![named("a")])]), Duration::from_secs(3));

        model.loading.store(true, Ordering::Release);
        model.load_devices(true).await;
        assert!(model.devices().is_empty());

        model.loading.store(false, Ordering::Release);
        model.load_devices(true).await;
        assert_eq!(model.devices().len(), 1);
        assert!(!model.is_loading());
    }
}
