//! Bulk payload encoding.
//!
//! Renders a batch of records into the OpenSearch `_bulk` NDJSON form:
//! an action line `{"create":{"_index":"<index>"}}` followed by the
//! record document, for each record, with a trailing newline. The
//! trailing newline is required by the bulk endpoint.

use crate::connection::IndexSharderFn;
use crate::record::LogRecord;

/// Render `records` into a single `_bulk` payload targeting `index`.
///
/// When a sharder is installed and the base index is non-empty, the
/// sharder maps the base index to the actual target per record, so one
/// payload may address several indices.
pub(crate) fn encode_bulk(
    records: &[LogRecord],
    index: &str,
    sharder: Option<&IndexSharderFn>,
) -> Result<String, serde_json::Error> {
    // rough pre-size: action line plus a typical document per record
    let mut payload = String::with_capacity(records.len() * 256);

    for record in records {
        let target = match sharder {
            Some(shard) if !index.is_empty() => shard(index),
            _ => index.to_owned(),
        };

        let action = serde_json::json!({ "create": { "_index": target } });
        payload.push_str(&serde_json::to_string(&action)?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(record)?);
        payload.push('\n');
    }

    Ok(payload)
}
