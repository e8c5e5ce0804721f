//! Connection configuration.
//!
//! A [`ConnectionConfig`] with an empty `host` is an *offline*
//! configuration: no client is built and records accumulate in the buffer
//! until a later online reconnect, an overflow drop, or the final drain.
//! Zero-valued numeric fields are normalized to the defaults below before
//! the config takes effect.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConnectionError;

// =============================================================================
// Defaults
// =============================================================================

/// Default pending-count multiple that triggers an eager flush
pub const DEFAULT_LOG_THRESHOLD: usize = 100;

/// Default maximum number of pending records before oldest-drop
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100;

/// Default initial retry delay after a failed bulk request
pub const DEFAULT_BACKOFF_INTERVAL: Duration = Duration::from_secs(10);

/// Default upper bound on the retry delay before a batch is given up
pub const DEFAULT_BACKOFF_LIMIT: Duration = Duration::from_secs(10 * 60);

/// Default interval between unconditional flush attempts while idle
pub const DEFAULT_IDLE_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default endpoint protocol
pub const DEFAULT_PROTOCOL: &str = "https";

/// Default endpoint port
pub const DEFAULT_PORT: u16 = 9200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a shipper [`Connection`](crate::Connection).
///
/// Deserializes from camelCase keys with humantime durations:
///
/// ```json
/// {
///   "host": "search.internal",
///   "index": "app-logs",
///   "appName": "billing",
///   "logThreshold": 50,
///   "backoffInterval": "10s",
///   "backoffLimit": "10m"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    /// OpenSearch host; empty means offline
    pub host: String,

    /// Endpoint port; 0 selects [`DEFAULT_PORT`]
    pub port: u16,

    /// Endpoint protocol; empty selects [`DEFAULT_PROTOCOL`]
    pub protocol: String,

    /// Basic-auth user; empty disables authentication
    pub user: String,

    /// Basic-auth password
    pub pass: String,

    /// Target index; required for online configurations
    pub index: String,

    /// Application name stamped into every admitted record
    pub app_name: String,

    /// Pending-count multiple that triggers an eager flush
    pub log_threshold: usize,

    /// Maximum pending records; excess causes oldest-drop
    pub max_buffer_size: usize,

    /// Initial retry delay after a failed bulk request
    #[serde(with = "humantime_serde")]
    pub backoff_interval: Duration,

    /// Upper bound on the retry delay before a batch is given up
    #[serde(with = "humantime_serde")]
    pub backoff_limit: Duration,

    /// Interval between unconditional flush attempts while idle
    #[serde(with = "humantime_serde")]
    pub idle_flush_interval: Duration,

    /// Derived by [`normalized`](Self::normalized); true when no endpoint
    /// is configured
    #[serde(skip)]
    pub offline: bool,
}

impl ConnectionConfig {
    /// Apply defaults, derive the offline flag, and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::IndexNameRequired`] when an online
    /// configuration names no index.
    pub fn normalized(&self) -> Result<Self, ConnectionError> {
        let mut cfg = self.clone();

        cfg.offline = cfg.host.is_empty();
        if !cfg.offline {
            if cfg.index.is_empty() {
                return Err(ConnectionError::IndexNameRequired);
            }
            if cfg.protocol.is_empty() {
                cfg.protocol = DEFAULT_PROTOCOL.to_owned();
            }
            if cfg.port == 0 {
                cfg.port = DEFAULT_PORT;
            }
        }

        if cfg.log_threshold == 0 {
            cfg.log_threshold = DEFAULT_LOG_THRESHOLD;
        }
        if cfg.max_buffer_size == 0 {
            cfg.max_buffer_size = DEFAULT_MAX_BUFFER_SIZE;
        }
        if cfg.backoff_interval.is_zero() {
            cfg.backoff_interval = DEFAULT_BACKOFF_INTERVAL;
        }
        if cfg.backoff_limit.is_zero() {
            cfg.backoff_limit = DEFAULT_BACKOFF_LIMIT;
        }
        if cfg.idle_flush_interval.is_zero() {
            cfg.idle_flush_interval = DEFAULT_IDLE_FLUSH_INTERVAL;
        }

        Ok(cfg)
    }

    /// True when this configuration has no endpoint and no client is built
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Endpoint base URL, `"<protocol>://<host>:<port>"`
    pub fn endpoint_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}
