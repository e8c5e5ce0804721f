//! Connection facade.
//!
//! A [`Connection`] binds a record buffer to one shipper task. Handles
//! share the connection by reference count: every logging handle calls
//! [`attach`](Connection::attach) while it lives and
//! [`detach`](Connection::detach) when it closes; the last detach drains
//! the buffer and terminates the shipper. `Connection` is cheap to clone;
//! clones address the same buffer and task.
//!
//! `log` is synchronous and blocks only on the state mutex, which is
//! held for constant-time mutations. The emergency and sharder
//! callbacks are published under that mutex and always invoked after it
//! is released, so a handler may safely call back into the facade.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

use crate::buffer::RecordBuffer;
use crate::client::{ClientFactory, HttpClientFactory};
use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::record::{LogRecord, Stats};
use crate::shipper::{Command, Shipper};

/// Callback receiving ordered batches of records the shipper will not
/// deliver (overflow drops, exhausted retries, offline drains,
/// synthetic diagnostics). Invoked outside any internal lock.
pub type EmergencyFn = dyn Fn(Vec<LogRecord>) + Send + Sync;

/// Callback mapping the configured base index to the actual target
/// index, applied per record while encoding a bulk payload.
pub type IndexSharderFn = dyn Fn(&str) -> String + Send + Sync;

/// State shared between the facade and the shipper task.
pub(crate) struct State {
    pub(crate) buffer: RecordBuffer,
    pub(crate) config: ConnectionConfig,
    /// Current retry delay; zero while deliveries succeed
    pub(crate) backoff: Duration,
    pub(crate) emergency: Option<Arc<EmergencyFn>>,
    pub(crate) sharder: Option<Arc<IndexSharderFn>>,
}

pub(crate) struct Shared {
    state: Mutex<State>,
    /// Single-slot wake signal; a failed try_send means a wake is
    /// already pending and the signals coalesce
    wake_tx: mpsc::Sender<()>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }
}

/// Handle to a buffered bulk-shipping connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    control_tx: mpsc::Sender<Command>,
}

impl Connection {
    /// Connect with the default HTTP client factory.
    ///
    /// The config is normalized first: zero-valued numerics become
    /// defaults and an empty host makes the connection offline. The
    /// calling task holds the initial reference; pair it with a final
    /// [`detach`](Self::detach) to drain and shut down.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ConnectionError> {
        Self::connect_with_factory(config, Arc::new(HttpClientFactory)).await
    }

    /// Connect with a caller-supplied client factory.
    pub async fn connect_with_factory(
        config: ConnectionConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, ConnectionError> {
        let config = config.normalized()?;

        let (control_tx, control_rx) = mpsc::channel(1);
        let (wake_tx, wake_rx) = mpsc::channel(1);

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                buffer: RecordBuffer::new(),
                config: config.clone(),
                backoff: Duration::ZERO,
                emergency: None,
                sharder: None,
            }),
            wake_tx,
        });

        tokio::spawn(Shipper::new(Arc::clone(&shared), factory, control_rx, wake_rx).run());

        let connection = Self { shared, control_tx };
        connection.attach().await?;

        // build the initial client through the shipper; tear the task
        // down again if construction fails
        if let Err(e) = connection.send_reconnect(config).await {
            let _ = connection.detach().await;
            return Err(e);
        }

        Ok(connection)
    }

    /// Admit one record.
    ///
    /// The configured `appName` is stamped onto the record. When the
    /// buffer is full the oldest records not in flight are dropped and
    /// forwarded to the emergency callback; when the pending count
    /// crosses a multiple of the log threshold a wake is signalled to
    /// the shipper.
    pub fn log(&self, record: LogRecord) {
        let mut record = record;

        let (dropped, emergency, wake) = {
            let mut state = self.shared.lock();
            let max_buffer_size = state.config.max_buffer_size;
            let log_threshold = state.config.log_threshold as u64;

            record.app_name = state.config.app_name.clone();
            let dropped = state.buffer.append(record, max_buffer_size);
            let wake = state.buffer.pending() % log_threshold == 0;
            let emergency = if dropped.is_empty() {
                None
            } else {
                state.emergency.clone()
            };
            (dropped, emergency, wake)
        };

        if wake {
            let _ = self.shared.wake_tx.try_send(());
        }

        if !dropped.is_empty() {
            tracing::debug!(records = dropped.len(), "buffer overflow, dropping oldest");
            if let Some(handler) = emergency {
                handler(dropped);
            }
        }
    }

    /// Add a reference to the connection.
    pub async fn attach(&self) -> Result<(), ConnectionError> {
        self.ref_change(1).await
    }

    /// Release a reference. The last detach performs the final drain:
    /// it waits for any in-flight send, attempts one last delivery (or
    /// hands the buffer to the emergency callback when offline), and
    /// returns only once the shipper task has finished.
    pub async fn detach(&self) -> Result<(), ConnectionError> {
        self.ref_change(-1).await
    }

    /// Swap the connection configuration.
    ///
    /// The new config is normalized and validated like at connect time.
    /// An offline config drops the client and lets records accumulate;
    /// an online config rebuilds the client and delivery resumes with
    /// whatever is still buffered.
    pub async fn reconnect(&self, config: ConnectionConfig) -> Result<(), ConnectionError> {
        self.send_reconnect(config.normalized()?).await
    }

    /// Install the emergency callback, returning the prior one.
    pub fn set_emergency_handler(
        &self,
        handler: Option<Arc<EmergencyFn>>,
    ) -> Option<Arc<EmergencyFn>> {
        let mut state = self.shared.lock();
        std::mem::replace(&mut state.emergency, handler)
    }

    /// Install the index sharder, returning the prior one.
    pub fn set_index_sharder(
        &self,
        sharder: Option<Arc<IndexSharderFn>>,
    ) -> Option<Arc<IndexSharderFn>> {
        let mut state = self.shared.lock();
        std::mem::replace(&mut state.sharder, sharder)
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> Stats {
        self.shared.lock().buffer.stats()
    }

    async fn ref_change(&self, delta: i64) -> Result<(), ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(Command::RefChange {
                delta,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        reply_rx.await.map_err(|_| ConnectionError::Closed)
    }

    async fn send_reconnect(&self, config: ConnectionConfig) -> Result<(), ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(Command::Reconnect {
                config,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        reply_rx.await.map_err(|_| ConnectionError::Closed)?
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;
