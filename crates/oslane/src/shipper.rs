//! Shipper task: owns the bulk client and drains the record buffer.
//!
//! # Design
//!
//! One shipper task runs per connection. It reacts to four event
//! sources in a `tokio::select!` loop:
//!
//! 1. control commands (reconfigure, refcount change) with synchronous
//!    acknowledgment,
//! 2. the single-slot wake signal producers fire on crossing the log
//!    threshold,
//! 3. a pump timer whose period is the current backoff delay while
//!    retrying, or a short idle interval otherwise.
//!
//! A flush takes the whole buffer and ships it in one bulk request. The
//! request runs in a short-lived task so the loop keeps observing timers
//! and control traffic; at most one request is in flight at a time. On
//! failure the batch is requeued at the head of the buffer and the delay
//! doubles until it would exceed the backoff limit, at which point the
//! batch is handed to the emergency callback and accounted as failed.
//!
//! The final flush, triggered when the refcount reaches zero, waits for
//! any in-flight request, drains the buffer, and blocks the loop until
//! the last send resolves so the process cannot terminate with a batch
//! outstanding. A failed final send is given up, never retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

use crate::client::{BulkClient, ClientFactory};
use crate::config::ConnectionConfig;
use crate::connection::{EmergencyFn, IndexSharderFn, Shared};
use crate::encode::encode_bulk;
use crate::error::ConnectionError;
use crate::record::LogRecord;

/// Control commands sent to the shipper task.
pub(crate) enum Command {
    /// Swap the effective config and rebuild (or drop) the client
    Reconnect {
        config: ConnectionConfig,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },

    /// Adjust the handle refcount; at zero the shipper drains and exits
    RefChange {
        delta: i64,
        reply: oneshot::Sender<()>,
    },
}

/// Snapshot of the state a single send needs, captured under the state
/// lock at the moment the batch is taken.
struct FlushJob {
    index: String,
    backoff_interval: Duration,
    backoff_limit: Duration,
    backoff: Duration,
    emergency: Option<Arc<EmergencyFn>>,
    sharder: Option<Arc<IndexSharderFn>>,
}

pub(crate) struct Shipper {
    shared: Arc<Shared>,
    factory: Arc<dyn ClientFactory>,
    control_rx: mpsc::Receiver<Command>,
    wake_rx: mpsc::Receiver<()>,
    client: Option<Arc<dyn BulkClient>>,
    refs: i64,
    /// Resolves when the in-flight send completes; None when idle
    in_flight: Option<oneshot::Receiver<()>>,
}

impl Shipper {
    pub(crate) fn new(
        shared: Arc<Shared>,
        factory: Arc<dyn ClientFactory>,
        control_rx: mpsc::Receiver<Command>,
        wake_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            shared,
            factory,
            control_rx,
            wake_rx,
            client: None,
            refs: 0,
            in_flight: None,
        }
    }

    /// Run the shipper loop until the last handle detaches.
    pub(crate) async fn run(mut self) {
        tracing::debug!("shipper task started");

        loop {
            // pump at the backoff delay while retrying, idle tick otherwise
            let pump = {
                let state = self.shared.lock();
                if state.backoff.is_zero() {
                    state.config.idle_flush_interval
                } else {
                    state.backoff
                }
            };

            tokio::select! {
                cmd = self.control_rx.recv() => {
                    match cmd {
                        Some(Command::Reconnect { config, reply }) => {
                            let result = self.reconfigure(config);
                            let _ = reply.send(result);
                        }
                        Some(Command::RefChange { delta, reply }) => {
                            self.refs += delta;
                            if self.refs <= 0 {
                                self.flush(true).await;
                                let _ = reply.send(());
                                break;
                            }
                            let _ = reply.send(());
                        }
                        None => {
                            // every handle dropped without detaching; drain anyway
                            self.flush(true).await;
                            break;
                        }
                    }
                }
                _ = self.wake_rx.recv() => {
                    self.flush(false).await;
                }
                _ = tokio::time::sleep(pump) => {
                    self.flush(false).await;
                }
            }
        }

        tracing::debug!("shipper task terminated");
    }

    /// Swap the effective config, clear the backoff, and rebuild the
    /// client (or drop it for an offline config).
    fn reconfigure(&mut self, config: ConnectionConfig) -> Result<(), ConnectionError> {
        {
            let mut state = self.shared.lock();
            state.config = config.clone();
            state.backoff = Duration::ZERO;
        }

        if config.is_offline() {
            self.client = None;
            tracing::debug!("shipper reconfigured offline");
            return Ok(());
        }

        match self.factory.build(&config) {
            Ok(client) => {
                self.client = Some(client);
                tracing::info!(
                    endpoint = %config.endpoint_url(),
                    index = %config.index,
                    "shipper reconfigured"
                );
                Ok(())
            }
            Err(e) => {
                self.client = None;
                Err(e)
            }
        }
    }

    /// Attempt one flush.
    ///
    /// Non-final flushes return immediately when offline or when a send
    /// is already in flight. The final flush waits for the in-flight
    /// send, drains what remains (including anything that send
    /// requeued), and resolves synchronously.
    async fn flush(&mut self, is_final: bool) {
        if self.client.is_none() && !is_final {
            return;
        }

        // single owner: at most one bulk send in flight per connection
        if let Some(mut done) = self.in_flight.take() {
            if is_final {
                let _ = done.await;
            } else {
                match done.try_recv() {
                    Err(TryRecvError::Empty) => {
                        self.in_flight = Some(done);
                        return;
                    }
                    // completed or task gone either way; the slot is free
                    Ok(()) | Err(TryRecvError::Closed) => {}
                }
            }
        }

        let (batch, job) = {
            let mut state = self.shared.lock();
            if state.buffer.is_empty() {
                state.backoff = Duration::ZERO;
                return;
            }
            let batch = state.buffer.take();
            let job = FlushJob {
                index: state.config.index.clone(),
                backoff_interval: state.config.backoff_interval,
                backoff_limit: state.config.backoff_limit,
                backoff: state.backoff,
                emergency: state.emergency.clone(),
                sharder: state.sharder.clone(),
            };
            (batch, job)
        };

        // no client (final drain while offline) or no target index:
        // the batch cannot be delivered, hand it over as-is
        let client = match &self.client {
            Some(client) if !job.index.is_empty() => Arc::clone(client),
            _ => {
                tracing::debug!(records = batch.len(), "draining undeliverable batch");
                hand_off(&job.emergency, batch);
                return;
            }
        };

        let shared = Arc::clone(&self.shared);
        if is_final {
            send_batch(shared, client, batch, job, true).await;
        } else {
            let (done_tx, done_rx) = oneshot::channel();
            self.in_flight = Some(done_rx);
            tokio::spawn(async move {
                send_batch(shared, client, batch, job, false).await;
                let _ = done_tx.send(());
            });
        }
    }
}

/// Encode and send one batch, then settle the outcome: acknowledge on
/// success, requeue with a doubled delay on a retriable failure, give
/// the batch up past the backoff limit or on a final flush.
async fn send_batch(
    shared: Arc<Shared>,
    client: Arc<dyn BulkClient>,
    batch: Vec<LogRecord>,
    job: FlushJob,
    is_final: bool,
) {
    let count = batch.len();

    let payload = match encode_bulk(&batch, &job.index, job.sharder.as_deref()) {
        Ok(payload) => payload,
        Err(e) => {
            // nothing a retry could fix; the batch is lost
            tracing::warn!(error = %e, records = count, "failed to encode bulk payload");
            emit_diagnostic(&job.emergency, format!("error marshalling record JSON: {e}"));
            give_up(&shared, &job.emergency, batch, job.backoff_interval);
            return;
        }
    };

    match client.bulk(payload).await {
        Ok(()) => {
            let mut state = shared.lock();
            state.buffer.record_sent(count);
            state.backoff = Duration::ZERO;
            tracing::trace!(records = count, "bulk delivery succeeded");
        }
        Err(e) => {
            tracing::warn!(error = %e, records = count, "bulk delivery failed");
            emit_diagnostic(
                &job.emergency,
                format!("error while storing records in opensearch: {e}"),
            );

            let next = if job.backoff.is_zero() {
                job.backoff_interval
            } else {
                job.backoff * 2
            };

            if next > job.backoff_limit || is_final {
                tracing::warn!(records = count, "giving up on batch");
                give_up(&shared, &job.emergency, batch, job.backoff_interval);
            } else {
                let mut state = shared.lock();
                state.buffer.requeue(batch);
                state.backoff = next;
            }
        }
    }
}

/// Forward a batch the shipper will not deliver to the emergency
/// callback, outside any lock. Without a handler the batch is dropped.
fn hand_off(emergency: &Option<Arc<EmergencyFn>>, batch: Vec<LogRecord>) {
    if let Some(handler) = emergency {
        handler(batch);
    }
}

/// Hand a batch over as undeliverable and account it as failed.
fn give_up(
    shared: &Shared,
    emergency: &Option<Arc<EmergencyFn>>,
    batch: Vec<LogRecord>,
    backoff_reset: Duration,
) {
    let count = batch.len();
    hand_off(emergency, batch);

    let mut state = shared.lock();
    state.buffer.record_failed(count);
    state.backoff = backoff_reset;
}

/// Emit a synthetic diagnostic record through the emergency path.
fn emit_diagnostic(emergency: &Option<Arc<EmergencyFn>>, message: String) {
    if let Some(handler) = emergency {
        handler(vec![LogRecord::diagnostic(message)]);
    }
}
