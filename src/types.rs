//! Core types for ordered-loader

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, FetchFailure};

/// Unique identifier for one aggregation run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    /// Create a new RunId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RunId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the items of a container are fetched, declared by the container itself
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One item fetch at a time, in container order; stops at the first failure
    Serial,
    /// All item fetches issued at once; failures are isolated
    #[default]
    Parallel,
}

impl Mode {
    /// Mode selected by the wire `serial` flag (absent means parallel)
    pub fn from_serial_flag(serial: Option<bool>) -> Self {
        if serial.unwrap_or(false) {
            Mode::Serial
        } else {
            Mode::Parallel
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Serial => write!(f, "serial"),
            Mode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Wire shape of a container: `{ title, chapters: [..], serial? }`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerWire {
    /// Container title
    pub title: String,
    /// Ordered item identifiers
    pub chapters: Vec<String>,
    /// Whether items must be fetched one after another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<bool>,
}

/// The enumerable parent resource: a title plus an ordered list of item ids
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container title
    pub title: String,
    /// Item identifiers in display order
    pub item_ids: Vec<String>,
    /// Fetch discipline for the items
    pub mode: Mode,
}

impl Container {
    /// Parse a container from a response body
    ///
    /// Only the structural shape is checked: `title` must be a string and
    /// `chapters` an array of strings.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        let wire: ContainerWire =
            serde_json::from_str(body).map_err(|e| Error::MalformedContainer(e.to_string()))?;
        Ok(wire.into())
    }

    /// Number of items declared by the container
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the container declares no items
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

impl From<ContainerWire> for Container {
    fn from(wire: ContainerWire) -> Self {
        Self {
            title: wire.title,
            item_ids: wire.chapters,
            mode: Mode::from_serial_flag(wire.serial),
        }
    }
}

/// Wire shape of one item: `{ id, text }`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Item identifier as reported by the server
    pub id: String,
    /// Item text
    pub text: String,
}

impl ItemRecord {
    /// Parse an item from a response body
    pub fn from_json(body: &str) -> Result<Self, FetchFailure> {
        serde_json::from_str(body).map_err(|e| FetchFailure::MalformedBody(e.to_string()))
    }
}

/// Wire shape of an error body: `{ error }`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error description
    pub error: String,
}

impl ErrorBody {
    /// Best-effort error description for a failed response
    ///
    /// Uses the `error` field when the body is an error document, the raw body
    /// otherwise, and `fallback` when the body is empty.
    pub fn describe(body: &str, fallback: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed.error,
            Err(_) if body.trim().is_empty() => fallback.to_string(),
            Err(_) => body.trim().to_string(),
        }
    }
}

/// Final outcome of one run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every item was delivered in order
    Completed,
    /// The container could not be fetched; no item was requested
    ContainerFailed,
    /// The container body was unusable; no item was requested
    MalformedContainer,
    /// At least one item failed (serial: the single failure that halted the chain)
    ItemsFailed {
        /// Positions of the failed items, ascending
        positions: Vec<usize>,
    },
    /// The run was reset while in flight and its results were dropped
    Discarded,
}

/// Summary of a closed run, returned by [`RunHandle::wait`](crate::aggregator::RunHandle::wait)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run ID
    pub run: RunId,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Number of items delivered to the consumer
    pub delivered: usize,
    /// Items received but never delivered because a predecessor failed
    pub buffered: usize,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run closed
    pub finished_at: DateTime<Utc>,
}

/// Events emitted during a run
///
/// Subscribe with [`Aggregator::subscribe`](crate::aggregator::Aggregator::subscribe).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run began fetching its container
    RunStarted {
        /// Run ID
        run: RunId,
        /// Container resource name
        resource: String,
    },

    /// The container was received and parsed
    ContainerReady {
        /// Run ID
        run: RunId,
        /// Container title
        title: String,
        /// Declared fetch mode
        mode: Mode,
        /// Number of items declared
        item_count: usize,
    },

    /// The container failed (fetch failure or malformed body)
    ContainerError {
        /// Run ID
        run: RunId,
        /// Error classification
        kind: ErrorKind,
        /// Error message
        error: String,
    },

    /// An item fetch was issued
    ItemRequested {
        /// Run ID
        run: RunId,
        /// Item position
        position: usize,
        /// Item identifier
        id: String,
    },

    /// An item was delivered to the consumer, in container order
    ItemReady {
        /// Run ID
        run: RunId,
        /// Item position
        position: usize,
        /// Item identifier
        id: String,
        /// Item text
        text: String,
    },

    /// An item fetch failed
    ItemError {
        /// Run ID
        run: RunId,
        /// Item position
        position: usize,
        /// Item identifier
        id: String,
        /// Error message
        error: String,
    },

    /// Every item was delivered
    Completed {
        /// Run ID
        run: RunId,
        /// Number of items delivered
        delivered: usize,
    },

    /// The run ended because of a failure
    Terminated {
        /// Run ID
        run: RunId,
        /// Number of items delivered before the failure
        delivered: usize,
        /// Items received but held back behind a failed slot
        buffered: usize,
    },

    /// The run was reset while in flight
    Discarded {
        /// Run ID
        run: RunId,
    },
}

impl Event {
    /// The run this event belongs to
    pub fn run(&self) -> RunId {
        match self {
            Event::RunStarted { run, .. }
            | Event::ContainerReady { run, .. }
            | Event::ContainerError { run, .. }
            | Event::ItemRequested { run, .. }
            | Event::ItemReady { run, .. }
            | Event::ItemError { run, .. }
            | Event::Completed { run, .. }
            | Event::Terminated { run, .. }
            | Event::Discarded { run } => *run,
        }
    }

    /// Whether this is the container-settled signal (ready or error)
    pub fn is_container_settled(&self) -> bool {
        matches!(
            self,
            Event::ContainerReady { .. } | Event::ContainerError { .. }
        )
    }

    /// Whether this is the last event of its run
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Event::Completed { .. } | Event::Terminated { .. } | Event::Discarded { .. }
        )
    }
}
