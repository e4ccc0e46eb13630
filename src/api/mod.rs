//! Remote backup API access.
//!
//! [`HttpTransport`] is the seam between the engine and the network: it
//! performs one authenticated GET or POST and reports either a status/body
//! pair or a transport failure. [`ReqwestTransport`] is the production
//! implementation. [`client::RemoteApi`] builds the WP Engine endpoints on
//! top of it, and [`wire`] holds the JSON shapes.

pub mod client;
pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

pub use client::RemoteApi;

/// A request ready to be sent.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: Url,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// A received response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No response was received (DNS, TLS, connect, timeout, body read).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable cause.
    pub message: String,
}

impl TransportError {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        // Drop the URL so query strings never reach logs.
        Self::new(format!("{kind}: {}", err.without_url()))
    }
}

/// Errors from remote API calls that expect a successful response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Credentials are missing; no request was attempted.
    #[error("API credentials not configured")]
    MissingCredentials,
    /// No response received.
    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
    /// The API answered with an unexpected status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized, truncated response body.
        body: String,
    },
    /// The body did not match any expected shape.
    #[error("invalid response format from API: {0}")]
    Parse(String),
    /// The configured base URL cannot carry the endpoint path.
    #[error("invalid API URL: {0}")]
    Url(String),
}

/// Performs authenticated requests against the remote API.
///
/// Implementations must be `Send + Sync`; the engine shares one transport
/// across scheduled runs and manual calls.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response is received.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Issue a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response is received.
    async fn post(&self, request: HttpRequest, body: String)
        -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest` with TLS verification enabled.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = builder.timeout(request.timeout);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let builder = self.client.get(request.url.clone());
        self.send(builder, request).await
    }

    async fn post(
        &self,
        request: HttpRequest,
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        let builder = self.client.post(request.url.clone()).body(body);
        self.send(builder, request).await
    }
}

/// Collapse whitespace, redact token-like strings, and cap the length of a
/// response body before it is stored or displayed.
pub fn sanitize_body(raw: &str) -> String {
    const MAX_BODY_CHARS: usize = 512;

    let mut sanitized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for pattern in [r"(?i)basic\s+[A-Za-z0-9+/=]{8,}", r"(?i)bearer\s+[A-Za-z0-9._\-]{8,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    if sanitized.chars().count() > MAX_BODY_CHARS {
        let shortened = sanitized.chars().take(MAX_BODY_CHARS).collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    sanitized
}
