//! Pool configuration.
//!
//! A [`PoolConfig`] is either built in code or read from the JSON section
//! the host keeps for the index plugin:
//!
//! ```json
//! {
//!   "EnableIndex": true,
//!   "IndexConnectionsCount": 1,
//!   "DynamicIndexConnectionsPool": false,
//!   "MaximumIndexConnectionsCount": 50,
//!   "HousekeepingInterval": 10,
//!   "MaximumConnectionRetries": 10
//! }
//! ```

use std::fmt;
use std::time::Duration;

use dicom_index_backend::BackendConfig;
use serde_json::Value as Json;

use crate::error::{PoolError, PoolResult};

/// Default size of a fixed pool.
pub const DEFAULT_CONNECTIONS_COUNT: usize = 1;

/// Default cap of an elastic pool.
pub const DEFAULT_MAX_CONNECTIONS_COUNT: usize = 50;

/// Default delay between two housekeeping runs.
pub const DEFAULT_HOUSEKEEPING_DELAY: Duration = Duration::from_secs(10);

/// Default period at which the housekeeping thread checks whether to run.
pub const DEFAULT_HOUSEKEEPING_TICK: Duration = Duration::from_secs(1);

/// Default age after which an idle elastic connection is evicted.
pub const DEFAULT_MAX_CONNECTION_AGE: Duration = Duration::from_secs(3600);

/// Default idle time after which an elastic connection is evicted.
pub const DEFAULT_MAX_CONNECTION_IDLE: Duration = Duration::from_secs(60);

/// Default wait between two attempts to acquire a connection.
pub const DEFAULT_ACQUIRE_RETRY: Duration = Duration::from_millis(100);

/// Default number of retries after a serialization conflict.
pub const DEFAULT_MAX_CONNECTION_RETRIES: u32 = 10;

/// Pool variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// A fixed number of connections, all opened up front.
    Fixed,
    /// Connections opened on demand up to a cap and evicted when idle.
    Elastic,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Fixed => write!(f, "fixed"),
            PoolKind::Elastic => write!(f, "elastic"),
        }
    }
}

/// Configuration of a connection pool.
///
/// # Example
///
/// ```rust
/// use dicom_index_pool::{PoolConfig, PoolKind};
/// use std::time::Duration;
///
/// let config = PoolConfig::builder()
///     .with_kind(PoolKind::Elastic)
///     .with_max_connections_count(8)
///     .with_housekeeping_delay(Duration::from_secs(5))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Whether the host uses this plugin for its index.
    pub enabled: bool,
    /// Pool variant.
    pub kind: PoolKind,
    /// Size of a fixed pool.
    pub connections_count: usize,
    /// Cap of an elastic pool.
    pub max_connections_count: usize,
    /// Minimum delay between two housekeeping runs.
    pub housekeeping_delay: Duration,
    /// Period at which the housekeeping thread wakes up.
    pub housekeeping_tick: Duration,
    /// Elastic connections older than this are evicted when idle.
    pub max_connection_age: Duration,
    /// Elastic connections idle for longer than this are evicted.
    pub max_connection_idle: Duration,
    /// Wait between two attempts to acquire a connection.
    pub acquire_retry: Duration,
    /// Retries after a serialization conflict, applied by the backend.
    pub max_connection_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: PoolKind::Fixed,
            connections_count: DEFAULT_CONNECTIONS_COUNT,
            max_connections_count: DEFAULT_MAX_CONNECTIONS_COUNT,
            housekeeping_delay: DEFAULT_HOUSEKEEPING_DELAY,
            housekeeping_tick: DEFAULT_HOUSEKEEPING_TICK,
            max_connection_age: DEFAULT_MAX_CONNECTION_AGE,
            max_connection_idle: DEFAULT_MAX_CONNECTION_IDLE,
            acquire_retry: DEFAULT_ACQUIRE_RETRY,
            max_connection_retries: DEFAULT_MAX_CONNECTION_RETRIES,
        }
    }
}

fn read_bool(section: &Json, key: &str, default: bool) -> PoolResult<bool> {
    match section.get(key) {
        None | Some(Json::Null) => Ok(default),
        Some(Json::Bool(value)) => Ok(*value),
        Some(other) => Err(PoolError::Configuration(format!(
            "{} must be a boolean, got {}",
            key, other
        ))),
    }
}

fn read_u64(section: &Json, key: &str, default: u64) -> PoolResult<u64> {
    match section.get(key) {
        None | Some(Json::Null) => Ok(default),
        Some(value) => value.as_u64().ok_or_else(|| {
            PoolError::Configuration(format!(
                "{} must be a non-negative integer, got {}",
                key, value
            ))
        }),
    }
}

fn read_count(section: &Json, key: &str, default: usize) -> PoolResult<usize> {
    let value = read_u64(section, key, default as u64)?;
    usize::try_from(value)
        .map_err(|_| PoolError::Configuration(format!("{} is too large: {}", key, value)))
}

impl PoolConfig {
    /// Creates a new builder for PoolConfig.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Reads the host configuration section of the index plugin.
    ///
    /// Missing keys keep their defaults; keys of the wrong type are
    /// configuration errors. The result is validated.
    pub fn from_json(section: &Json) -> PoolResult<Self> {
        if !section.is_object() {
            return Err(PoolError::Configuration(
                "the index configuration must be a JSON object".to_string(),
            ));
        }

        let defaults = Self::default();
        let dynamic = read_bool(section, "DynamicIndexConnectionsPool", false)?;
        let retries = read_u64(
            section,
            "MaximumConnectionRetries",
            u64::from(defaults.max_connection_retries),
        )?;

        let config = Self {
            enabled: read_bool(section, "EnableIndex", defaults.enabled)?,
            kind: if dynamic {
                PoolKind::Elastic
            } else {
                PoolKind::Fixed
            },
            connections_count: read_count(
                section,
                "IndexConnectionsCount",
                defaults.connections_count,
            )?,
            max_connections_count: read_count(
                section,
                "MaximumIndexConnectionsCount",
                defaults.max_connections_count,
            )?,
            housekeeping_delay: Duration::from_secs(read_u64(
                section,
                "HousekeepingInterval",
                defaults.housekeeping_delay.as_secs(),
            )?),
            max_connection_retries: u32::try_from(retries).map_err(|_| {
                PoolError::Configuration(format!(
                    "MaximumConnectionRetries is too large: {}",
                    retries
                ))
            })?,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the sizes of the selected pool variant.
    pub fn validate(&self) -> PoolResult<()> {
        match self.kind {
            PoolKind::Fixed if self.connections_count == 0 => Err(PoolError::Configuration(
                "a fixed pool needs at least one connection".to_string(),
            )),
            PoolKind::Elastic if self.max_connections_count == 0 => {
                Err(PoolError::Configuration(
                    "an elastic pool needs a maximum of at least one connection".to_string(),
                ))
            }
            _ if self.housekeeping_tick.is_zero() => Err(PoolError::Configuration(
                "the housekeeping tick cannot be zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// `base` with the retry count of this configuration.
    pub fn backend_config(&self, base: BackendConfig) -> BackendConfig {
        BackendConfig {
            max_retries: self.max_connection_retries,
            ..base
        }
    }
}

/// Builder for PoolConfig.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Selects the pool variant.
    pub fn with_kind(mut self, kind: PoolKind) -> Self {
        self.config.kind = kind;
        self
    }

    /// Sets the size of a fixed pool.
    pub fn with_connections_count(mut self, count: usize) -> Self {
        self.config.connections_count = count;
        self
    }

    /// Sets the cap of an elastic pool.
    pub fn with_max_connections_count(mut self, count: usize) -> Self {
        self.config.max_connections_count = count;
        self
    }

    /// Sets the minimum delay between two housekeeping runs.
    pub fn with_housekeeping_delay(mut self, delay: Duration) -> Self {
        self.config.housekeeping_delay = delay;
        self
    }

    /// Sets the housekeeping wake-up period.
    pub fn with_housekeeping_tick(mut self, tick: Duration) -> Self {
        self.config.housekeeping_tick = tick;
        self
    }

    /// Sets the age after which idle elastic connections are evicted.
    pub fn with_max_connection_age(mut self, age: Duration) -> Self {
        self.config.max_connection_age = age;
        self
    }

    /// Sets the idle time after which elastic connections are evicted.
    pub fn with_max_connection_idle(mut self, idle: Duration) -> Self {
        self.config.max_connection_idle = idle;
        self
    }

    /// Sets the wait between two acquire attempts.
    pub fn with_acquire_retry(mut self, retry: Duration) -> Self {
        self.config.acquire_retry = retry;
        self
    }

    /// Sets the retries after a serialization conflict.
    pub fn with_max_connection_retries(mut self, retries: u32) -> Self {
        self.config.max_connection_retries = retries;
        self
    }

    /// Builds the config.
    pub fn build(self) -> PoolConfig {
        self.config
    }
}
