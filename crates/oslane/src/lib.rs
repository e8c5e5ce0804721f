//! oslane - buffered bulk shipper for structured log records
//!
//! Forwards rendered log records to an OpenSearch-compatible `_bulk`
//! endpoint from a bounded in-memory queue, with threshold- and
//! timer-driven flushing, exponential-backoff retries, and an emergency
//! callback for records that cannot be delivered.
//!
//! # Architecture
//!
//! ```text
//! [handles] --log--> [RecordBuffer] --wake/timer--> [Shipper task] --NDJSON--> [_bulk]
//!                         |                              |
//!                         +-- overflow drops --+   retry exhausted / final
//!                                              v         v
//!                                        [emergency callback]
//! ```
//!
//! One shipper task runs per [`Connection`]; handles share it by
//! reference count ([`Connection::attach`] / [`Connection::detach`]),
//! and the last detach drains the buffer before returning. The HTTP
//! transport sits behind the [`BulkClient`] trait so tests can
//! substitute an in-process double via [`ClientFactory`].
//!
//! # Example
//!
//! ```ignore
//! use oslane::{Connection, ConnectionConfig, LogRecord};
//!
//! let config = ConnectionConfig {
//!     host: "search.internal".into(),
//!     index: "app-logs".into(),
//!     app_name: "billing".into(),
//!     ..ConnectionConfig::default()
//! };
//!
//! let connection = Connection::connect(config).await?;
//! connection.log(LogRecord::new("service started").with_lane_id("main"));
//! // ...
//! connection.detach().await?; // last detach drains the buffer
//! ```

/// Bounded record buffer with drop-oldest admission
mod buffer;

/// Bulk NDJSON payload assembly
mod encode;

/// Shipper task: flush loop, backoff, final drain
mod shipper;

/// `BulkClient` trait and the `reqwest` implementation
pub mod client;

/// Connection configuration and defaults
pub mod config;

/// Public facade shared by logging handles
pub mod connection;

/// Error types
pub mod error;

/// Record and statistics types
pub mod record;

pub use client::{BulkClient, BulkError, ClientFactory, HttpBulkClient, HttpClientFactory};
pub use config::ConnectionConfig;
pub use connection::{Connection, EmergencyFn, IndexSharderFn};
pub use error::ConnectionError;
pub use record::{DIAGNOSTIC_APP_NAME, LogRecord, Stats};
