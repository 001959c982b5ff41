//! Configuration types for the index backend.

use std::time::Duration;

/// Default number of parsed statements kept per connection.
pub const DEFAULT_STATEMENT_CACHE: usize = 128;

/// Default number of extra attempts after a serialization conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default base delay between attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for the index backend.
///
/// # Example
///
/// ```rust
/// use dicom_index_backend::BackendConfig;
/// use std::time::Duration;
///
/// let config = BackendConfig::builder()
///     .with_statement_cache(256)
///     .with_max_retries(3)
///     .with_retry_backoff(Duration::from_millis(10))
///     .build();
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Capacity of the per-connection statement cache (0 disables caching).
    pub statement_cache: usize,
    /// Extra attempts after a [`CannotSerialize`](crate::BackendError::CannotSerialize) failure.
    pub max_retries: u32,
    /// Base delay; attempt `n` sleeps `retry_backoff * (n + 1)`.
    pub retry_backoff: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            statement_cache: DEFAULT_STATEMENT_CACHE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl BackendConfig {
    /// Creates a new builder for BackendConfig.
    pub fn builder() -> BackendConfigBuilder {
        BackendConfigBuilder::default()
    }
}

/// Builder for BackendConfig.
#[derive(Debug, Clone, Default)]
pub struct BackendConfigBuilder {
    config: BackendConfig,
}

impl BackendConfigBuilder {
    /// Sets the statement cache capacity.
    pub fn with_statement_cache(mut self, capacity: usize) -> Self {
        self.config.statement_cache = capacity;
        self
    }

    /// Sets the number of retries after a serialization conflict.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the base retry delay.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Builds the BackendConfig.
    pub fn build(self) -> BackendConfig {
        self.config
    }
}
