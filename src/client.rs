//! Device fetch client.
//!
//! # Guard state machine
//!
//! ```text
//! Idle --fetch--> InFlight --exit (any path)--> Idle
//!   \                                            |
//!    `-- fetch inside debounce window: sleep remaining, re-issue once
//! InFlight --fetch--> RequestThrottled (no I/O)
//! ```
//!
//! Each started request opens a debounce window measured from its start.
//! The in-flight flag is released by [`InFlightGuard`] on drop, so success,
//! error, cancellation and panic all return the client to idle. The debounce
//! window is a deadline and lapses on its own.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::decode::decode_devices;
use crate::endpoint::DeviceEndpoint;
use crate::error::{FetchError, FetchResult};
use crate::transport::Transport;
use crate::types::DeviceRecord;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transport attempts, at least 1.
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// API credentials and base URL.
#[derive(Debug, Clone)]
pub struct ApiTarget {
    pub base_url: String,
    pub api_key: String,
}

/// Source of device lists. The coordinating model depends on this rather than
/// on [`DeviceClient`] directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn fetch_devices(&self, latest_point: bool) -> FetchResult<Vec<DeviceRecord>>;
}

#[derive(Debug)]
struct GuardState {
    in_flight: bool,
    debounce_until: Option<Instant>,
}

enum Admission<'a> {
    Granted(InFlightGuard<'a>),
    Throttled,
    Debounce(Duration),
}

/// Releases the in-flight flag when dropped.
struct InFlightGuard<'a> {
    state: &'a Mutex<GuardState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.in_flight = false;
    }
}

/// HTTP client for the `/device` endpoint with single-flight, debounce and
/// retry.
pub struct DeviceClient<T: Transport> {
    transport: T,
    target: ApiTarget,
    retry: RetryPolicy,
    debounce: Duration,
    state: Mutex<GuardState>,
}

impl<T: Transport> DeviceClient<T> {
    pub fn new(transport: T, target: ApiTarget) -> Self {
        Self {
            transport,
            target,
            retry: RetryPolicy::default(),
            debounce: Duration::from_millis(500),
            state: Mutex::new(GuardState {
                in_flight: false,
                debounce_until: None,
            }),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        };
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Whether a request currently holds the single-flight slot.
    pub fn is_in_flight(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Fetches and decodes all devices.
    ///
    /// Fails immediately with [`FetchError::RequestThrottled`] while another
    /// request is in flight. Inside the debounce window of a previous request
    /// the call waits out the window and tries once more.
    pub async fn fetch_devices(&self, latest_point: bool) -> FetchResult<Vec<DeviceRecord>> {
        let _guard = match self.admit() {
            Admission::Granted(guard) => guard,
            Admission::Throttled => {
                tracing::debug!("fetch rejected, request already in flight");
                return Err(FetchError::RequestThrottled);
            }
            Admission::Debounce(remaining) => {
                tracing::debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "fetch inside debounce window, deferring"
                );
                tokio::time::sleep(remaining).await;
                match self.admit() {
                    Admission::Granted(guard) => guard,
                    _ => return Err(FetchError::RequestThrottled),
                }
            }
        };

        let url = DeviceEndpoint::Devices { latest_point }.url(&self.target.base_url, &self.target.api_key)?;
        tracing::info!(latest_point, "fetching devices");

        let body = self.get_with_retry(&url).await?;

        match decode_devices(&body) {
            Ok(devices) => {
                tracing::info!(count = devices.len(), "devices fetched");
                Ok(devices)
            }
            Err(e) => {
                tracing::error!(error = %e, bytes = body.len(), "failed to decode device payload");
                Err(e.into())
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GuardState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Check and claim happen under one lock so racing callers cannot both pass.
    fn admit(&self) -> Admission<'_> {
        let mut state = self.lock_state();
        if state.in_flight {
            return Admission::Throttled;
        }
        let now = Instant::now();
        if let Some(until) = state.debounce_until {
            if until > now {
                return Admission::Debounce(until - now);
            }
        }
        state.in_flight = true;
        state.debounce_until = Some(now + self.debounce);
        Admission::Granted(InFlightGuard { state: &self.state })
    }

    async fn get_with_retry(&self, url: &reqwest::Url) -> FetchResult<Vec<u8>> {
        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let failure = match self.transport.get(url).await {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => FetchError::HttpStatus(response.status),
                Err(e) => e,
            };

            if attempt == max_attempts {
                tracing::warn!(attempt, error = %failure, "fetch failed, retries exhausted");
                break;
            }

            let delay = self.retry.delay_after(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "fetch attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
        Err(FetchError::MaxRetryExceeded)
    }
}

#[async_trait]
impl<T: Transport> DeviceSource for DeviceClient<T> {
    async fn fetch_devices(&self, latest_point: bool) -> FetchResult<Vec<DeviceRecord>> {
        DeviceClient::fetch_devices(self, latest_point).await
    }
}
