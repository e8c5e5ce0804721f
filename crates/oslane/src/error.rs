//! Connection error types.

use thiserror::Error;

/// Errors surfaced by [`Connection`](crate::Connection) operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// An online configuration did not name a target index
    #[error("an online configuration must name a target index")]
    IndexNameRequired,

    /// Building the bulk client from the configuration failed
    #[error("failed to build bulk client: {0}")]
    ClientBuild(String),

    /// The shipper task has terminated (the final detach already completed)
    #[error("connection is closed")]
    Closed,
}
