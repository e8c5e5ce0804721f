//! Bulk client interface and the HTTP implementation.
//!
//! The shipper talks to the bulk endpoint through the [`BulkClient`]
//! trait so tests can substitute an in-process double. The production
//! implementation is [`HttpBulkClient`], a thin `reqwest` wrapper that
//! POSTs the rendered NDJSON payload to `<endpoint>/_bulk`.
//!
//! Non-2xx responses carry the raw body in the error: some endpoints
//! answer auth failures with plain-text bodies (a bare 401 page, say)
//! that JSON-minded clients would otherwise swallow, and those bodies
//! are the only useful diagnostic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::ConnectionError;

/// Connect timeout for the HTTP client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout; bulk payloads can be large
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from a bulk request.
#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    /// Transport-level failure (connect, DNS, timeout)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response; `body` is the raw response body so plain-text
    /// error pages surface verbatim in the message
    #[error("[{status}] {body}")]
    Rejected { status: u16, body: String },
}

/// Executes one bulk insert against the endpoint.
#[async_trait]
pub trait BulkClient: Send + Sync {
    /// Submit a fully rendered NDJSON payload to the `_bulk` endpoint.
    async fn bulk(&self, payload: String) -> Result<(), BulkError>;
}

/// Builds a [`BulkClient`] for a normalized online configuration.
///
/// The factory is the transport seam: production code uses
/// [`HttpClientFactory`]; tests hand
/// [`Connection::connect_with_factory`](crate::Connection::connect_with_factory)
/// a factory returning a mock.
pub trait ClientFactory: Send + Sync {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ClientBuild`] when the client cannot be
    /// constructed; the error is surfaced synchronously from
    /// `connect`/`reconnect`.
    fn build(&self, config: &ConnectionConfig) -> Result<Arc<dyn BulkClient>, ConnectionError>;
}

/// `reqwest`-backed bulk client.
pub struct HttpBulkClient {
    http: reqwest::Client,
    bulk_url: String,
    user: String,
    pass: String,
}

impl HttpBulkClient {
    /// Build a client for the endpoint described by `config`.
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConnectionError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            bulk_url: format!("{}/_bulk", config.endpoint_url()),
            user: config.user.clone(),
            pass: config.pass.clone(),
        })
    }

    /// Full `_bulk` endpoint URL this client posts to
    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }
}

#[async_trait]
impl BulkClient for HttpBulkClient {
    async fn bulk(&self, payload: String) -> Result<(), BulkError> {
        let mut request = self
            .http
            .post(&self.bulk_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson");

        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.pass));
        }

        let response = request.body(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Rejected {
                status: status.as_u16(),
                body: body.trim_end().to_owned(),
            });
        }

        Ok(())
    }
}

/// Default factory producing [`HttpBulkClient`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn build(&self, config: &ConnectionConfig) -> Result<Arc<dyn BulkClient>, ConnectionError> {
        Ok(Arc::new(HttpBulkClient::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_url_from_config() {
        let cfg = ConnectionConfig {
            host: "search.internal".into(),
            index: "logs".into(),
            ..ConnectionConfig::default()
        }
        .normalized()
        .unwrap();

        let client = HttpBulkClient::new(&cfg).unwrap();
        assert_eq!(client.bulk_url(), "https://search.internal:9200/_bulk");
    }

    #[test]
    fn test_bulk_url_explicit_protocol_and_port() {
        let cfg = ConnectionConfig {
            host: "127.0.0.1".into(),
            port: 9201,
            protocol: "http".into(),
            index: "logs".into(),
            ..ConnectionConfig::default()
        }
        .normalized()
        .unwrap();

        let client = HttpBulkClient::new(&cfg).unwrap();
        assert_eq!(client.bulk_url(), "http://127.0.0.1:9201/_bulk");
    }

    #[test]
    fn test_rejected_error_carries_body() {
        let err = BulkError::Rejected {
            status: 401,
            body: "Unauthorized".into(),
        };
        assert_eq!(err.to_string(), "[401] Unauthorized");
    }
}
