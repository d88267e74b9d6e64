//! Transport port: how resources are requested
//!
//! The aggregation core only needs one capability: "fetch this resource name,
//! give me a status code and a body". [`Transport`] is that capability, and
//! [`HttpTransport`] is the reqwest-backed implementation used in production.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::error::{Error, FetchFailure, Result, TransportError};
use crate::types::ErrorBody;


/// Raw response to a fetch: status code plus body text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl FetchResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Successful response with the given body
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// Not-found response carrying an `{ error }` body
    pub fn not_found(error: &str) -> Self {
        Self::new(404, serde_json::json!({ "error": error }).to_string())
    }

    /// Turn the response into the resource body, or the reason it is unusable
    ///
    /// - `200` yields the body
    /// - `404` is [`FetchFailure::NotFound`], described by the `{ error }` body
    /// - anything else is [`FetchFailure::Status`]
    pub fn into_body(self) -> std::result::Result<String, FetchFailure> {
        let reason = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status");

        match self.status {
            200 => Ok(self.body),
            404 => Err(FetchFailure::NotFound {
                detail: ErrorBody::describe(&self.body, reason),
            }),
            code => Err(FetchFailure::Status {
                code,
                detail: ErrorBody::describe(&self.body, reason),
            }),
        }
    }
}

/// Resolve a transport result into the resource body
pub(crate) fn resolve(
    result: std::result::Result<FetchResponse, TransportError>,
) -> std::result::Result<String, FetchFailure> {
    result.map_err(FetchFailure::from)?.into_body()
}

/// Capability to fetch a resource by name
///
/// Implementations must be cheap to share across tasks: the aggregator keeps
/// one behind an `Arc` and issues concurrent fetches through it in parallel
/// mode.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use ordered_loader::error::TransportError;
/// use ordered_loader::transport::{FetchResponse, Transport};
///
/// struct Static;
///
/// #[async_trait]
/// impl Transport for Static {
///     async fn fetch(&self, resource: &str) -> Result<FetchResponse, TransportError> {
///         match resource {
///             "story" => Ok(FetchResponse::ok(r#"{"title":"t","chapters":[]}"#)),
///             _ => Ok(FetchResponse::not_found("no such resource")),
///         }
///     }
///
///     fn name(&self) -> &'static str {
///         "static"
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET-style request for `resource`
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response was obtained at all.
    /// Non-success statuses are not errors at this layer; they are returned
    /// as a [`FetchResponse`] and classified by the caller.
    async fn fetch(&self, resource: &str) -> std::result::Result<FetchResponse, TransportError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// HTTP transport resolving resource names against a base URL
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: url::Url,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport from configuration
    ///
    /// # Errors
    ///
    /// Fails if the base URL does not parse or the HTTP client cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let base_url = url::Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(
                "transport.base_url",
                format!("'{}' cannot be used as a base URL", config.base_url),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url,
            timeout: config.request_timeout,
        })
    }

    fn resource_url(&self, resource: &str) -> std::result::Result<url::Url, TransportError> {
        self.base_url
            .join(resource)
            .map_err(|e| TransportError::InvalidResource {
                name: resource.to_string(),
                reason: e.to_string(),
            })
    }

    fn map_request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, resource: &str) -> std::result::Result<FetchResponse, TransportError> {
        let url = self.resource_url(resource)?;
        tracing::debug!(url = %url, "sending request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e))?;

        tracing::debug!(url = %url, status, bytes = body.len(), "response received");
        Ok(FetchResponse { status, body })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
