//! Log record and statistics types.
//!
//! A [`LogRecord`] is a fully rendered log entry as produced by the logging
//! facade. The shipper never inspects the message content; it only stamps
//! the application name at admission and serializes the record into the
//! bulk payload. Field names follow the OpenSearch document schema, so the
//! serialized form is the wire form.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Application name stamped on synthetic diagnostic records the shipper
/// produces about itself (encode failures, rejected bulk requests).
pub const DIAGNOSTIC_APP_NAME: &str = "OpenSearchLane";

/// Metadata key carrying the record creation time.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// A single rendered log record.
///
/// Empty optional fields are omitted from the serialized document;
/// `appName` is always present. `metadata` always carries a `timestamp`
/// entry in RFC3339 UTC, stamped by [`LogRecord::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogRecord {
    /// Application name; overwritten with the configured `appName` when
    /// the record is admitted to a connection.
    pub app_name: String,

    /// Lane id of the parent context, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub parent_lane_id: String,

    /// Correlation id spanning multiple lanes, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub journey_id: String,

    /// Lane id of the originating context
    #[serde(skip_serializing_if = "String::is_empty")]
    pub lane_id: String,

    /// The rendered log message
    #[serde(skip_serializing_if = "String::is_empty")]
    pub log_message: String,

    /// Free-form string metadata; always includes [`TIMESTAMP_KEY`]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl LogRecord {
    /// Create a record with the given message and a fresh `timestamp`
    /// metadata entry.
    pub fn new(message: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(TIMESTAMP_KEY.to_owned(), now_rfc3339());

        Self {
            log_message: message.into(),
            metadata,
            ..Self::default()
        }
    }

    /// Create a diagnostic record describing a shipper-internal problem.
    ///
    /// Diagnostic records are emitted through the emergency callback only;
    /// they are never enqueued for delivery.
    pub(crate) fn diagnostic(message: impl Into<String>) -> Self {
        let mut record = Self::new(message);
        record.app_name = DIAGNOSTIC_APP_NAME.to_owned();
        record
    }

    /// Set the lane id
    #[must_use]
    pub fn with_lane_id(mut self, lane_id: impl Into<String>) -> Self {
        self.lane_id = lane_id.into();
        self
    }

    /// Set the parent lane id
    #[must_use]
    pub fn with_parent_lane_id(mut self, parent_lane_id: impl Into<String>) -> Self {
        self.parent_lane_id = parent_lane_id.into();
        self
    }

    /// Set the journey id
    #[must_use]
    pub fn with_journey_id(mut self, journey_id: impl Into<String>) -> Self {
        self.journey_id = journey_id.into();
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Current time in RFC3339 UTC with second precision.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Point-in-time snapshot of the connection delivery counters.
///
/// All three counters are monotonic. `queued - sent` is the number of
/// records admitted but not yet acknowledged by the server (buffered or
/// in flight); records that were dropped or given up appear in
/// `sent_failed` and remain counted in `queued`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Records admitted via `log`
    pub queued: u64,

    /// Records acknowledged by the bulk endpoint
    pub sent: u64,

    /// Records dropped on overflow or given up after delivery failure
    pub sent_failed: u64,
}
