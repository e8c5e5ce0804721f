//! Bounded in-memory record buffer.
//!
//! The buffer is plain data; the connection's state mutex guards every
//! access. Admission applies the drop-oldest policy, `take` hands batch
//! ownership to the shipper, and `requeue` puts a failed batch back at
//! the head so retry order is preserved.
//!
//! The three delivery counters live here so that `pending = queued - sent`
//! can be read consistently with the buffer contents under one lock.
//! Records handed out by `take` stay part of `pending` until they are
//! recorded sent or failed; the difference between `pending` and the
//! buffer length is the in-flight amount.

use crate::record::{LogRecord, Stats};

/// Bounded FIFO of pending records with delivery accounting.
#[derive(Debug, Default)]
pub(crate) struct RecordBuffer {
    records: Vec<LogRecord>,
    queued: u64,
    sent: u64,
    sent_failed: u64,
}

impl RecordBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records admitted but not yet acknowledged (buffered + in flight,
    /// including records that ended up in `sent_failed`).
    pub(crate) fn pending(&self) -> u64 {
        self.queued - self.sent
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Admit one record, dropping the oldest buffered records when the
    /// pending count has reached `max_buffer_size`.
    ///
    /// Only buffered records can be dropped; a batch already handed to an
    /// in-flight send is never rescinded. Dropped records are accounted in
    /// `sent_failed` here, atomically with the admission, and returned so
    /// the caller can forward them to the emergency callback after
    /// releasing the lock.
    pub(crate) fn append(&mut self, record: LogRecord, max_buffer_size: usize) -> Vec<LogRecord> {
        let mut dropped = Vec::new();

        let pending = self.pending() as usize;
        if pending >= max_buffer_size {
            let overflow = pending + 1 - max_buffer_size;
            let cut = overflow.min(self.records.len());
            if cut > 0 {
                dropped = self.records.drain(..cut).collect();
                self.sent_failed += cut as u64;
            }
        }

        self.records.push(record);
        self.queued += 1;

        dropped
    }

    /// Swap the buffer for an empty one of the same capacity hint and
    /// return the prior contents. The returned batch remains pending
    /// until the caller accounts it via `record_sent` or `record_failed`.
    pub(crate) fn take(&mut self) -> Vec<LogRecord> {
        let capacity = self.records.len();
        std::mem::replace(&mut self.records, Vec::with_capacity(capacity))
    }

    /// Put a previously taken batch back at the head of the buffer,
    /// ahead of anything admitted while the batch was in flight.
    pub(crate) fn requeue(&mut self, mut batch: Vec<LogRecord>) {
        batch.append(&mut self.records);
        self.records = batch;
    }

    /// Account `count` records as acknowledged by the server.
    pub(crate) fn record_sent(&mut self, count: usize) {
        self.sent += count as u64;
    }

    /// Account `count` records as lost (given up or failed delivery).
    pub(crate) fn record_failed(&mut self, count: usize) {
        self.sent_failed += count as u64;
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats {
            queued: self.queued,
            sent: self.sent,
            sent_failed: self.sent_failed,
        }
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;
