//! # ordered-loader
//!
//! Load a container resource and every item it lists, and deliver the items
//! to a consumer strictly in the container's order.
//!
//! ## Design Philosophy
//!
//! ordered-loader is designed to be:
//! - **Order-preserving** - Items surface in container order no matter when their responses arrive
//! - **Data-driven** - The container decides whether items are fetched serially or in parallel
//! - **Library-first** - No CLI or UI; display goes through a [`PresentationSink`]
//! - **Event-driven** - Consumers subscribe to run events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use ordered_loader::{Config, Loader, WriterSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.transport.base_url = "http://localhost:8080/".to_string();
//!
//!     let loader = Loader::with_http(config, Arc::new(WriterSink::new(std::io::stdout())))?;
//!
//!     // Subscribe to events
//!     let mut events = loader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = loader.load().await?.wait().await?;
//!     println!("{:?}", summary.outcome);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Ordered aggregation of a container and its items
pub mod aggregator;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Minimum-visible-duration gate for the loading indicator
pub mod gate;
/// Aggregator, gate and sink wired together
pub mod loader;
/// Presentation sinks
pub mod sink;
/// Transport port and HTTP transport
pub mod transport;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use aggregator::{Aggregator, RunHandle};
pub use config::Config;
pub use error::{Error, ErrorKind, FetchFailure, Result, TransportError};
pub use gate::{GateCycle, GatePhase, GateState, VisibilityGate};
pub use loader::Loader;
pub use sink::{PresentationSink, TracingSink, WriterSink};
pub use transport::{FetchResponse, HttpTransport, Transport};
pub use types::{Container, Event, ItemRecord, Mode, RunId, RunOutcome, RunSummary};
