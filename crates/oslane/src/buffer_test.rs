use super::*;

fn record(message: &str) -> LogRecord {
    LogRecord::new(message)
}

fn messages(records: &[LogRecord]) -> Vec<&str> {
    records.iter().map(|r| r.log_message.as_str()).collect()
}

// =============================================================================
// Admission
// =============================================================================

#[test]
fn test_append_below_capacity_drops_nothing() {
    let mut buffer = RecordBuffer::new();

    for i in 0..5 {
        let dropped = buffer.append(record(&format!("m{i}")), 10);
        assert!(dropped.is_empty());
    }

    assert_eq!(buffer.len(), 5);
    assert_eq!(buffer.pending(), 5);
    assert_eq!(buffer.stats().queued, 5);
    assert_eq!(buffer.stats().sent_failed, 0);
}

#[test]
fn test_append_at_capacity_drops_oldest() {
    let mut buffer = RecordBuffer::new();

    for i in 0..3 {
        buffer.append(record(&format!("m{i}")), 3);
    }
    let dropped = buffer.append(record("m3"), 3);

    assert_eq!(messages(&dropped), ["m0"]);
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.stats().queued, 4);
    assert_eq!(buffer.stats().sent_failed, 1);

    let batch = buffer.take();
    assert_eq!(messages(&batch), ["m1", "m2", "m3"]);
}

#[test]
fn test_overflow_drop_scales_with_unacknowledged_backlog() {
    let mut buffer = RecordBuffer::new();

    // first overflow drops one; the dropped record stays unacknowledged,
    // so the next admission must shed two to get back under the cap
    for i in 0..4 {
        buffer.append(record(&format!("m{i}")), 3);
    }
    let dropped = buffer.append(record("m4"), 3);

    assert_eq!(messages(&dropped), ["m1", "m2"]);
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.stats().sent_failed, 3);
}

#[test]
fn test_in_flight_batch_never_rescinded() {
    let mut buffer = RecordBuffer::new();

    for i in 0..3 {
        buffer.append(record(&format!("m{i}")), 3);
    }
    let in_flight = buffer.take();
    assert_eq!(in_flight.len(), 3);

    // pending is still 3, but nothing buffered is eligible to drop
    let dropped = buffer.append(record("m3"), 3);
    assert!(dropped.is_empty());
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.pending(), 4);
    assert_eq!(buffer.stats().sent_failed, 0);
}

// =============================================================================
// Batch ownership
// =============================================================================

#[test]
fn test_take_empties_buffer_but_keeps_pending() {
    let mut buffer = RecordBuffer::new();
    buffer.append(record("m0"), 10);
    buffer.append(record("m1"), 10);

    let batch = buffer.take();
    assert_eq!(messages(&batch), ["m0", "m1"]);
    assert!(buffer.is_empty());
    assert_eq!(buffer.pending(), 2);

    buffer.record_sent(batch.len());
    assert_eq!(buffer.pending(), 0);
    assert_eq!(buffer.stats().sent, 2);
}

#[test]
fn test_requeue_preserves_order_across_admissions() {
    let mut buffer = RecordBuffer::new();
    buffer.append(record("m0"), 10);
    buffer.append(record("m1"), 10);

    let batch = buffer.take();
    buffer.append(record("m2"), 10);
    buffer.requeue(batch);

    let drained = buffer.take();
    assert_eq!(messages(&drained), ["m0", "m1", "m2"]);
}

#[test]
fn test_requeue_into_empty_buffer() {
    let mut buffer = RecordBuffer::new();
    buffer.append(record("m0"), 10);

    let batch = buffer.take();
    buffer.requeue(batch);

    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.pending(), 1);
}

// =============================================================================
// Accounting
// =============================================================================

#[test]
fn test_counters_are_monotonic_and_consistent() {
    let mut buffer = RecordBuffer::new();

    for i in 0..10 {
        buffer.append(record(&format!("m{i}")), 100);
    }
    let batch = buffer.take();
    buffer.record_sent(batch.len());

    for i in 10..13 {
        buffer.append(record(&format!("m{i}")), 100);
    }
    let batch = buffer.take();
    buffer.record_failed(batch.len());

    let stats = buffer.stats();
    assert_eq!(stats.queued, 13);
    assert_eq!(stats.sent, 10);
    assert_eq!(stats.sent_failed, 3);
    assert!(stats.queued >= stats.sent + stats.sent_failed);
    assert_eq!(buffer.pending(), 3);
}
