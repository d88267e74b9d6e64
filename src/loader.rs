//! Loader: one aggregator, one visibility gate, one sink.
//!
//! A load arms the gate and starts the aggregator together. A watcher task
//! follows the run's events and tells the gate once the container settled,
//! so the indicator hides no earlier than the configured minimum and no later
//! than the container result. Item fetches are never held back by the gate.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::aggregator::{Aggregator, RunHandle};
use crate::config::Config;
use crate::error::Result;
use crate::gate::{GateCycle, VisibilityGate};
use crate::sink::PresentationSink;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Event, RunId};

/// Loads a container and its items into a presentation sink
///
/// # Example
///
/// ```no_run
/// use ordered_loader::{Config, Loader, TracingSink};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut config = Config::default();
/// config.transport.base_url = "https://stories.example.com/".to_string();
///
/// let loader = Loader::with_http(config, Arc::new(TracingSink))?;
/// let summary = loader.load().await?.wait().await?;
/// println!("delivered {} items", summary.delivered);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Loader {
    aggregator: Aggregator,
    gate: VisibilityGate,
    sink: Arc<dyn PresentationSink>,
}

impl Loader {
    /// Create a loader over the given transport
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Self> {
        let aggregator = Aggregator::new(config, transport, Arc::clone(&sink))?;
        let gate = VisibilityGate::new(Arc::clone(&sink));
        Ok(Self {
            aggregator,
            gate,
            sink,
        })
    }

    /// Create a loader fetching over HTTP from `config.transport.base_url`
    pub fn with_http(config: Config, sink: Arc<dyn PresentationSink>) -> Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        Self::new(config, Arc::new(transport), sink)
    }

    /// The underlying aggregator
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// The loading indicator gate
    pub fn gate(&self) -> &VisibilityGate {
        &self.gate
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.aggregator.subscribe()
    }

    /// Load the configured container (`config.resources.container`)
    pub async fn load(&self) -> Result<RunHandle> {
        let resource = self.aggregator.config().resources.container.clone();
        self.load_resource(&resource).await
    }

    /// Load the container named `resource`
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunActive`](crate::Error::RunActive) if a load is still
    /// in flight; the indicator is left untouched in that case.
    pub async fn load_resource(&self, resource: &str) -> Result<RunHandle> {
        // Subscribe first so the container signal cannot be missed
        let events = self.aggregator.subscribe();
        let handle = self.aggregator.start(resource).await?;

        let min_visible = self.aggregator.config().loader.min_visible;
        let cycle = self.gate.arm(min_visible).await;

        tokio::spawn(watch_container(events, self.gate.clone(), handle.id(), cycle));
        Ok(handle)
    }

    /// Abandon the live load, hide the indicator and clear the sink
    pub async fn reset(&self) {
        if let Some(run) = self.aggregator.reset().await {
            tracing::info!(run = %run, "load reset");
        }
        self.gate.reset().await;
        self.sink.on_reset();
    }
}

/// Notify the gate once `run`'s container settled or the run ended
///
/// A run discarded by [`Aggregator::reset`] also releases the indicator. Item
/// events only follow a settled container, so a lagging receiver that missed
/// the container event still notifies on the next one it sees.
async fn watch_container(
    mut events: broadcast::Receiver<Event>,
    gate: VisibilityGate,
    run: RunId,
    cycle: GateCycle,
) {
    loop {
        match events.recv().await {
            Ok(event) if event.run() != run => {}
            Ok(Event::RunStarted { .. }) => {}
            Ok(event) => {
                if !event.is_container_settled() && !event.is_final() {
                    tracing::debug!(run = %run, "container signal missed, releasing indicator");
                }
                gate.notify_data_ready(cycle).await;
                return;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(run = %run, skipped, "container watcher lagged");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
