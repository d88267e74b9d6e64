//! Ordered aggregator: fetch a container, then its items, deliver items in order.
//!
//! The work is split into focused submodules:
//! - [`run`] - slot state machine and the in-order flush cursor
//! - `driver` - the task that performs the fetches for one run
//!
//! One [`Aggregator`] runs at most one load at a time. A load started while
//! another is live is rejected, not queued; [`Aggregator::reset`] releases the
//! live run so a new one can start.

mod driver;
pub mod run;


use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sink::PresentationSink;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Event, RunId, RunSummary};

use driver::RunContext;

/// The run currently allowed to report to the consumer
struct ActiveRun {
    id: RunId,
    cancel: CancellationToken,
    presenting: Arc<Mutex<()>>,
}

/// Handle to a started run
#[must_use = "dropping the handle detaches the run; use wait() to observe its summary"]
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// ID of the run
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Wait for the run to close and return its summary
    pub async fn wait(self) -> Result<RunSummary> {
        self.task
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))
    }
}

/// Orchestrates container and item fetches (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Aggregator {
    /// Transport used for every fetch
    transport: Arc<dyn Transport>,
    /// Consumer of titles, items and errors
    sink: Arc<dyn PresentationSink>,
    /// Configuration
    config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// The live run, if any
    active: Arc<Mutex<Option<ActiveRun>>>,
    /// Source of run IDs
    next_run_id: Arc<AtomicU64>,
}

impl Aggregator {
    /// Create an aggregator over the given transport
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(config.events.channel_capacity);

        Ok(Self {
            transport,
            sink,
            config: Arc::new(config),
            event_tx,
            active: Arc::new(Mutex::new(None)),
            next_run_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Create an aggregator fetching over HTTP from `config.transport.base_url`
    pub fn with_http(config: Config, sink: Arc<dyn PresentationSink>) -> Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        Self::new(config, Arc::new(transport), sink)
    }

    /// Subscribe to run events
    ///
    /// Subscribe before [`start`](Self::start) to be sure to see every event of
    /// that run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// ID of the live run, if any
    pub async fn active_run(&self) -> Option<RunId> {
        self.active.lock().await.as_ref().map(|run| run.id)
    }

    /// Start loading the container named `resource`
    ///
    /// Returns immediately; the run proceeds on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunActive`] if a run is still live. The rejection is
    /// also reported to the sink as a container-fetch error.
    pub async fn start(&self, resource: &str) -> Result<RunHandle> {
        let mut active = self.active.lock().await;

        if let Some(live) = active.as_ref() {
            let error = Error::RunActive(live.id);
            tracing::warn!(run = %live.id, resource, "start rejected, run already in progress");
            self.sink.on_error(error.kind(), &error.to_string());
            return Err(error);
        }

        let id = RunId::new(self.next_run_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        let presenting = Arc::new(Mutex::new(()));
        *active = Some(ActiveRun {
            id,
            cancel: cancel.clone(),
            presenting: Arc::clone(&presenting),
        });

        let ctx = RunContext {
            run: id,
            resource: resource.to_string(),
            resources: self.config.resources.clone(),
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            event_tx: self.event_tx.clone(),
            cancel,
            presenting,
        };

        let slot = Arc::clone(&self.active);
        let task = tokio::spawn(async move {
            let summary = driver::drive(ctx).await;
            release(&slot, id).await;
            summary
        });

        Ok(RunHandle { id, task })
    }

    /// Start loading the configured container (`config.resources.container`)
    pub async fn start_default(&self) -> Result<RunHandle> {
        let resource = self.config.resources.container.clone();
        self.start(&resource).await
    }

    /// Release the live run so a new one may start
    ///
    /// The released run issues no further fetches. Fetches already in flight
    /// finish and their results are dropped. Once this returns the released
    /// run makes no further sink calls. Returns the released run's ID.
    pub async fn reset(&self) -> Option<RunId> {
        let released = self.active.lock().await.take()?;
        released.cancel.cancel();
        // Wait out a delivery already in progress; it stops at its next item
        drop(released.presenting.lock().await);
        tracing::info!(run = %released.id, "run reset");
        Some(released.id)
    }
}

/// Clear the live-run slot if it still belongs to `id`
async fn release(active: &Mutex<Option<ActiveRun>>, id: RunId) {
    let mut active = active.lock().await;
    if active.as_ref().is_some_and(|run| run.id == id) {
        *active = None;
    }
}
