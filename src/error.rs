//! Error types for ordered-loader
//!
//! This module provides the error taxonomy for a load:
//! - Container-level failures (fetch failure, malformed container)
//! - Item-level failures, keyed by the item's position in the container
//! - Transport failures raised by a [`Transport`](crate::transport::Transport)
//! - Ambient failures (configuration, HTTP client construction)
//!
//! Every load error maps onto an [`ErrorKind`], which is what a
//! [`PresentationSink`](crate::sink::PresentationSink) receives.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::RunId;

/// Result type alias for ordered-loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ordered-loader
#[derive(Debug, Error)]
pub enum Error {
    /// The container could not be fetched (transport failure or non-200 status)
    #[error("container fetch failed: {0}")]
    ContainerFetch(FetchFailure),

    /// The container was fetched but its body does not have the expected shape
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// One item could not be fetched
    #[error("item {position} ({id}) fetch failed: {failure}")]
    ItemFetch {
        /// Position of the item in the container's item list
        position: usize,
        /// The item identifier
        id: String,
        /// Why the fetch failed
        failure: FetchFailure,
    },

    /// A run is already in flight; the caller must wait for it or reset first
    #[error("a load is already in progress (run {0})")]
    RunActive(RunId),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "transport.base_url")
        key: Option<String>,
    },

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A base URL or resource URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The task driving a run panicked or was aborted
    #[error("run task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Classify this error for presentation
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ContainerFetch(_) | Error::RunActive(_) => ErrorKind::ContainerFetch,
            Error::MalformedContainer(_) => ErrorKind::MalformedContainer,
            Error::ItemFetch { position, .. } => ErrorKind::ItemFetch {
                position: *position,
            },
            Error::Config { .. }
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::InvalidUrl(_)
            | Error::TaskFailed(_) => ErrorKind::Configuration,
        }
    }

    /// Shorthand for a configuration error tied to a config key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Machine-readable classification of an error, as seen by a presentation sink
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure or non-200 status on the container
    ContainerFetch,
    /// Container body could not be parsed into a container
    MalformedContainer,
    /// Transport failure, non-200 status or unparsable body on one item
    ItemFetch {
        /// Position of the failed item
        position: usize,
    },
    /// Setup problem unrelated to a particular load
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ContainerFetch => write!(f, "container_fetch"),
            ErrorKind::MalformedContainer => write!(f, "malformed_container"),
            ErrorKind::ItemFetch { position } => write!(f, "item_fetch[{position}]"),
            ErrorKind::Configuration => write!(f, "configuration"),
        }
    }
}

/// Why a single fetch (container or item) did not produce a usable resource
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The resource does not exist (status 404)
    #[error("not found: {detail}")]
    NotFound {
        /// Error description from the response body
        detail: String,
    },

    /// Any status other than 200 or 404
    #[error("unexpected status {code}: {detail}")]
    Status {
        /// HTTP-style status code
        code: u16,
        /// Response body or error description
        detail: String,
    },

    /// The request never produced a response
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The response was successful but its body could not be parsed
    #[error("malformed body: {0}")]
    MalformedBody(String),
}

impl FetchFailure {
    /// Status code carried by this failure, if a response was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchFailure::NotFound { .. } => Some(404),
            FetchFailure::Status { code, .. } => Some(*code),
            FetchFailure::Transport(_) | FetchFailure::MalformedBody(_) => None,
        }
    }
}

/// Transport-level failures raised by a [`Transport`](crate::transport::Transport)
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read
    #[error("request failed: {0}")]
    Request(String),

    /// No response arrived within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The resource name could not be turned into a request
    #[error("invalid resource name '{name}': {reason}")]
    InvalidResource {
        /// The offending resource name
        name: String,
        /// Why it was rejected
        reason: String,
    },
}
