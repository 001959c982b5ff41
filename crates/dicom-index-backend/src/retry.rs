//! Retry of transactions that fail to serialize.
//!
//! Only [`BackendError::CannotSerialize`] is retried: any other failure is
//! returned on the first attempt. Attempt `n` (counted from zero) waits
//! `retry_backoff * (n + 1)` before running again.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::manager::{DatabaseManager, Transaction};
use crate::traits::TransactionMode;

/// Delay before retrying after failed attempt `attempt`.
pub fn backoff_delay(config: &BackendConfig, attempt: u32) -> Duration {
    config.retry_backoff.saturating_mul(attempt.saturating_add(1))
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// or has been retried `config.max_retries` times.
///
/// # Example
///
/// ```rust
/// use dicom_index_backend::{with_retries, BackendConfig, BackendError};
/// use std::time::Duration;
///
/// let config = BackendConfig::builder()
///     .with_max_retries(3)
///     .with_retry_backoff(Duration::from_millis(1))
///     .build();
///
/// let mut calls = 0;
/// let value = with_retries(&config, || {
///     calls += 1;
///     if calls < 3 {
///         Err(BackendError::CannotSerialize("conflict".to_string()))
///     } else {
///         Ok(calls)
///     }
/// })
/// .unwrap();
/// assert_eq!(value, 3);
/// ```
pub fn with_retries<T, F>(config: &BackendConfig, mut operation: F) -> BackendResult<T>
where
    F: FnMut() -> BackendResult<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = backoff_delay(config, attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying transaction"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    return Err(BackendError::CannotSerialize(format!(
                        "giving up after {} retries: {}",
                        attempt, err
                    )));
                }
                return Err(err);
            }
        }
    }
}

impl DatabaseManager {
    /// [`transaction`](Self::transaction) retried on serialization
    /// conflicts, with the retry settings the manager was opened with.
    ///
    /// `f` runs once per attempt, each time in a fresh transaction.
    pub fn transaction_with_retries<T, F>(&mut self, mode: TransactionMode, mut f: F) -> BackendResult<T>
    where
        F: FnMut(&mut Transaction<'_>) -> BackendResult<T>,
    {
        let config = self.config().clone();
        with_retries(&config, || self.transaction(mode, &mut f))
    }
}
