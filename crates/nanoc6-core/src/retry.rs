//! Retrying transient BLE and backend failures.
//!
//! A NanoC6 restarts advertising after every disconnect and the backend is
//! reached over Wi-Fi on the other side, so connects and uploads fail
//! transiently often enough to be worth a second try. Only errors that can
//! succeed on a later attempt are retried; a 4xx answer or a malformed
//! payload is returned immediately.
//!
//! # Example
//!
//! ```
//! use nanoc6_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let uploaded = with_retry(&RetryConfig::for_backend(), "insert reading", || async move {
//!     Ok::<_, Error>(true)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ConnectionFailureReason, Error, Result};

/// How often and how patiently to retry.
///
/// The delay doubles after every failed attempt, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Stretch each delay by up to a quarter at random.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default delays with `max_retries` retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Try exactly once.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Connecting to a device that may still be busy with another central
    /// or not yet advertising again.
    pub fn for_connect() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }

    /// Backend requests. Only transport failures, 5xx and 429 are retried.
    pub fn for_backend() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    fn delay(&self, retry: u32) -> Duration {
        let doubled = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);
        if self.jitter {
            doubled.mul_f64(1.0 + rand::rng().random_range(0.0..0.25))
        } else {
            doubled
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of
/// retries. The last error is returned.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation_name: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!("{} succeeded after {} retries", operation_name, retry);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable(&error) || retry >= config.max_retries {
            return Err(error);
        }

        let delay = config.delay(retry);
        retry += 1;
        warn!(
            "{} failed: {} (retry {}/{} in {:?})",
            operation_name, error, retry, config.max_retries, delay
        );
        sleep(delay).await;
    }
}

/// Whether a later attempt may succeed.
pub(crate) fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Timeout { .. }
        | Error::Bluetooth(_)
        | Error::NotConnected
        | Error::WriteFailed { .. }
        | Error::Io(_) => true,
        Error::ConnectionFailed { reason, .. } => matches!(
            reason,
            ConnectionFailureReason::Timeout | ConnectionFailureReason::BleError(_)
        ),
        Error::Http(e) => e.status().is_none_or(|s| s.is_server_error()),
        Error::Backend { status, .. } => *status >= 500 || *status == 429,
        Error::InvalidData(_)
        | Error::UnexpectedResponse { .. }
        | Error::DeviceNotFound(_)
        | Error::CharacteristicNotFound { .. }
        | Error::Cancelled
        | Error::InvalidConfig(_) => false,
    }
}
