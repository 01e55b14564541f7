//! Transport boundary for the operation pipeline.
//!
//! The pipeline talks to the network through the [`Transport`] trait: one
//! request in, one [`Response`] out, with connection-level failures raised
//! as a distinguishable [`TransportError`] while protocol-level outcomes
//! (including non-2xx statuses) come back as normal responses.
//!
//! [`HttpTransport`] is the built-in reqwest-backed implementation. Tests
//! and embedders can supply their own `Transport` to stub the network.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::resource::Verb;

/// Crate version advertised in the default User-Agent.
const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connection-level failures from the transport.
///
/// These are I/O conditions that never produced an HTTP response. The
/// handler's rescue chain may substitute a mock 503 for the first two
/// variants when `mock_response_on_connection_error` is set.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The request timed out before a response arrived.
    #[error("connection timed out: {0}")]
    Timeout(String),

    /// Any other transport failure (TLS, malformed URL, stream error).
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Checks whether this failure is eligible for mock-response
    /// substitution (refused or timed out, per the rescue policy).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_) | Self::Timeout(_))
    }
}

/// One concrete HTTP request handed to the transport.
///
/// This is the wire half of an operation reflection: verb, URL, final
/// headers, an already-encoded body, and the transport option mapping.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// The HTTP verb to use.
    pub verb: Verb,
    /// The absolute request URL.
    pub url: String,
    /// Final request headers, name-cased as they should be sent.
    pub headers: BTreeMap<String, String>,
    /// The encoded request body, when the verb carries one.
    pub body: Option<String>,
    /// Transport options (e.g. `timeout` in seconds).
    pub options: Map<String, Value>,
}

impl TransportRequest {
    /// Reads the request timeout from the option mapping, when present.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.options
            .get("timeout")
            .and_then(Value::as_f64)
            .map(Duration::from_secs_f64)
    }
}

/// One HTTP response as the pipeline sees it.
///
/// Headers are stored lowercased; repeated headers are joined with `, `.
/// The freshness accessors ([`Response::expires`], [`Response::max_age`],
/// [`Response::freshness_deadline`]) feed the optional model-level cache
/// decoration.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// The raw response body.
    pub body: String,
}

impl Response {
    /// Creates a response from raw parts, normalizing header names.
    #[must_use]
    pub fn new(status: u16, headers: Vec<(String, String)>, body: String) -> Self {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let entry = map.entry(name.to_ascii_lowercase()).or_default();
            if entry.is_empty() {
                entry.push_str(&value);
            } else {
                let _ = write!(entry, ", {value}");
            }
        }
        Self {
            status,
            headers: map,
            body,
        }
    }

    /// Synthesizes a mock response, used by the connection-error rescue
    /// policy to stand in for a response that was never received.
    #[must_use]
    pub fn mock(status: u16, message: &str) -> Self {
        Self::new(
            status,
            vec![
                ("Status".to_string(), status.to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
            ],
            message.to_string(),
        )
    }

    /// Checks for a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns the Content-Type, without parameters.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    /// Returns the canonical reason phrase for the status code.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
    }

    /// Parses the `Date` header.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.header("date").and_then(parse_http_date)
    }

    /// Parses the `Expires` header.
    #[must_use]
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.header("expires").and_then(parse_http_date)
    }

    /// Reads `max-age` out of the `Cache-Control` header, in seconds.
    #[must_use]
    pub fn max_age(&self) -> Option<i64> {
        let cache_control = self.header("cache-control")?;
        cache_control.split(',').find_map(|directive| {
            let directive = directive.trim();
            directive
                .strip_prefix("max-age=")
                .and_then(|v| v.parse().ok())
        })
    }

    /// Computes the instant this response stops being fresh: an explicit
    /// expiry, else date plus max-age, else `now` (immediately stale).
    #[must_use]
    pub fn freshness_deadline(&self) -> DateTime<Utc> {
        if let Some(expires) = self.expires() {
            return expires;
        }
        if let (Some(date), Some(max_age)) = (self.date(), self.max_age()) {
            return date + chrono::Duration::seconds(max_age);
        }
        Utc::now()
    }
}

/// Parses an RFC 7231 HTTP-date (RFC 2822 format in practice).
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A collaborator that performs exactly one HTTP request.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Performs the request, returning the response or a connection-level
    /// error. Non-2xx statuses are normal responses here; classification
    /// happens in the operation handler.
    async fn perform(&self, request: &TransportRequest) -> Result<Response, TransportError>;
}

/// The built-in reqwest-backed transport.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the underlying client cannot
    /// be constructed (e.g. TLS initialization failure).
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    fn classify(error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(error.to_string())
        } else if error.is_connect() {
            TransportError::ConnectionRefused(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, request: &TransportRequest) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.verb.as_str().as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        let mut has_user_agent = false;
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                has_user_agent = true;
            }
            builder = builder.header(name, value);
        }
        if !has_user_agent {
            builder = builder.header("User-Agent", format!("rest-record v{CRATE_VERSION}"));
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| Self::classify(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Response::new(status, headers, body))
    }
}
