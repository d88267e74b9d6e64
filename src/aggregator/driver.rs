//! The task that owns one [`AggregationRun`] and performs its fetches.
//!
//! All run state is touched from this task only. In parallel mode every item
//! fetch is in flight at once, but completions are pulled one at a time from
//! a `FuturesUnordered`, so slot updates stay single-writer.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use super::run::{AggregationRun, ReadyItem};
use crate::config::ResourceConfig;
use crate::error::{Error, FetchFailure};
use crate::sink::PresentationSink;
use crate::transport::{self, Transport};
use crate::types::{Container, Event, ItemRecord, Mode, RunId, RunOutcome, RunSummary};

/// Everything the run task needs, moved into it at start
pub(super) struct RunContext {
    pub(super) run: RunId,
    pub(super) resource: String,
    pub(super) resources: ResourceConfig,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) sink: Arc<dyn PresentationSink>,
    pub(super) event_tx: broadcast::Sender<Event>,
    pub(super) cancel: CancellationToken,
    /// Held while the run talks to the sink; reset waits on it after cancelling
    pub(super) presenting: Arc<Mutex<()>>,
}

impl RunContext {
    fn discarded(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn emit(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }

    /// Report an error to the sink and the event channel unless the run was discarded
    async fn report(&self, error: &Error, event: Event) -> bool {
        let _presenting = self.presenting.lock().await;
        if self.discarded() {
            return false;
        }
        self.sink.on_error(error.kind(), &error.to_string());
        self.emit(event);
        true
    }

    /// Hand newly contiguous items to the sink, stopping as soon as the run is discarded
    async fn deliver(&self, ready: Vec<ReadyItem>) -> bool {
        if ready.is_empty() {
            return !self.discarded();
        }
        let _presenting = self.presenting.lock().await;
        for item in ready {
            if self.discarded() {
                tracing::debug!(run = %self.run, position = item.position, "dropping item of discarded run");
                return false;
            }
            tracing::debug!(run = %self.run, position = item.position, id = %item.id, "delivering item");
            self.sink.on_item_ready(&item.id, &item.text);
            self.emit(Event::ItemReady {
                run: self.run,
                position: item.position,
                id: item.id,
                text: item.text,
            });
        }
        true
    }
}

/// How dispatching ended
enum Dispatch {
    /// Every issued fetch resolved (or the chain halted)
    Settled,
    /// The run was reset while fetches were in flight
    Discarded,
}

/// Drive one run from container fetch to close
pub(super) async fn drive(ctx: RunContext) -> RunSummary {
    let started_at = Utc::now();
    let mut run = AggregationRun::new();

    tracing::info!(run = %ctx.run, resource = %ctx.resource, transport = ctx.transport.name(), "run started");
    ctx.emit(Event::RunStarted {
        run: ctx.run,
        resource: ctx.resource.clone(),
    });

    let fetched = transport::resolve(ctx.transport.fetch(&ctx.resource).await);
    if ctx.discarded() {
        return discard(&ctx, &run, started_at);
    }

    let container = match fetched
        .map_err(Error::ContainerFetch)
        .and_then(|body| Container::from_json(&body))
    {
        Ok(container) => container,
        Err(error) => {
            tracing::warn!(run = %ctx.run, resource = %ctx.resource, error = %error, "container failed");
            let _presenting = ctx.presenting.lock().await;
            if ctx.discarded() {
                return discard(&ctx, &run, started_at);
            }
            ctx.sink.on_error(error.kind(), &error.to_string());
            ctx.emit(Event::ContainerError {
                run: ctx.run,
                kind: error.kind(),
                error: error.to_string(),
            });
            let outcome = match error {
                Error::MalformedContainer(_) => RunOutcome::MalformedContainer,
                _ => RunOutcome::ContainerFailed,
            };
            return close(&ctx, &run, outcome, started_at);
        }
    };

    let title = container.title.clone();
    let mode = container.mode;
    let item_count = container.len();
    if let Err(e) = run.accept_container(container) {
        // A fresh run never has a container yet
        tracing::error!(run = %ctx.run, error = %e, "container rejected by run state");
    }

    {
        let _presenting = ctx.presenting.lock().await;
        if ctx.discarded() {
            return discard(&ctx, &run, started_at);
        }
        tracing::info!(run = %ctx.run, title = %title, mode = %mode, items = item_count, "container ready");
        ctx.sink.on_container_title(&title);
        ctx.emit(Event::ContainerReady {
            run: ctx.run,
            title,
            mode,
            item_count,
        });
    }

    let dispatch = match mode {
        Mode::Serial => fetch_serial(&ctx, &mut run).await,
        Mode::Parallel => fetch_parallel(&ctx, &mut run).await,
    };

    // A reset that lands after the last delivery still discards the run
    let _presenting = ctx.presenting.lock().await;
    if matches!(dispatch, Dispatch::Discarded) || ctx.discarded() {
        return discard(&ctx, &run, started_at);
    }

    if !run.is_settled() {
        tracing::error!(run = %ctx.run, "dispatch ended with items still pending");
    }
    if run.is_complete() {
        close(&ctx, &run, RunOutcome::Completed, started_at)
    } else {
        let positions = run.failed_positions();
        close(&ctx, &run, RunOutcome::ItemsFailed { positions }, started_at)
    }
}

/// Fetch items one after another; the first failure halts the chain
async fn fetch_serial(ctx: &RunContext, run: &mut AggregationRun) -> Dispatch {
    let ids: Vec<String> = run.slots().iter().map(|s| s.id.clone()).collect();

    for (position, id) in ids.into_iter().enumerate() {
        if run.is_terminated() {
            break;
        }
        if ctx.discarded() {
            return Dispatch::Discarded;
        }

        request(ctx, position, &id);
        let result = fetch_item(ctx.transport.as_ref(), &ctx.resources.item_resource(&id)).await;
        if ctx.discarded() {
            return Dispatch::Discarded;
        }

        let presented = match result {
            Ok(record) => receive(ctx, run, position, &id, record).await,
            Err(failure) => {
                let presented = fail(ctx, run, position, id, failure).await;
                run.terminate();
                tracing::info!(run = %ctx.run, position, "serial chain halted");
                presented
            }
        };
        if !presented {
            return Dispatch::Discarded;
        }
    }

    Dispatch::Settled
}

/// Issue every item fetch at once and handle completions as they arrive
async fn fetch_parallel(ctx: &RunContext, run: &mut AggregationRun) -> Dispatch {
    let mut in_flight = FuturesUnordered::new();

    for slot in run.slots() {
        request(ctx, slot.position, &slot.id);
        let transport = Arc::clone(&ctx.transport);
        let resource = ctx.resources.item_resource(&slot.id);
        let position = slot.position;
        let id = slot.id.clone();
        in_flight.push(async move {
            let result = fetch_item(transport.as_ref(), &resource).await;
            (position, id, result)
        });
    }

    let mut discarded = false;
    while let Some((position, id, result)) = in_flight.next().await {
        // In-flight fetches are never aborted; after a reset their results are dropped
        if discarded || ctx.discarded() {
            discarded = true;
            tracing::debug!(run = %ctx.run, position, "dropping result of discarded run");
            continue;
        }

        let presented = match result {
            Ok(record) => receive(ctx, run, position, &id, record).await,
            Err(failure) => fail(ctx, run, position, id, failure).await,
        };
        discarded = !presented;
    }

    if discarded {
        Dispatch::Discarded
    } else {
        Dispatch::Settled
    }
}

async fn fetch_item(
    transport: &dyn Transport,
    resource: &str,
) -> Result<ItemRecord, FetchFailure> {
    let body = transport::resolve(transport.fetch(resource).await)?;
    ItemRecord::from_json(&body)
}

fn request(ctx: &RunContext, position: usize, id: &str) {
    tracing::debug!(run = %ctx.run, position, id, "requesting item");
    ctx.emit(Event::ItemRequested {
        run: ctx.run,
        position,
        id: id.to_string(),
    });
}

/// Record a received item; returns false once the run turns out to be discarded
async fn receive(
    ctx: &RunContext,
    run: &mut AggregationRun,
    position: usize,
    id: &str,
    record: ItemRecord,
) -> bool {
    if record.id != id {
        tracing::warn!(run = %ctx.run, position, expected = id, received = %record.id, "item id mismatch, using container id");
    }
    match run.mark_received(position, record) {
        Ok(ready) => {
            if ready.is_empty() {
                tracing::debug!(run = %ctx.run, position, cursor = run.flush_cursor(), "item buffered behind gap");
            }
            ctx.deliver(ready).await
        }
        Err(e) => {
            tracing::error!(run = %ctx.run, position, error = %e, "dropping item");
            !ctx.discarded()
        }
    }
}

/// Record a failed item; returns false once the run turns out to be discarded
async fn fail(
    ctx: &RunContext,
    run: &mut AggregationRun,
    position: usize,
    id: String,
    failure: FetchFailure,
) -> bool {
    if let Err(e) = run.mark_failed(position) {
        tracing::error!(run = %ctx.run, position, error = %e, "cannot mark item failed");
        return !ctx.discarded();
    }
    let status = failure.status_code();
    let error = Error::ItemFetch {
        position,
        id: id.clone(),
        failure,
    };
    tracing::warn!(run = %ctx.run, position, status = ?status, error = %error, "item failed");
    let event = Event::ItemError {
        run: ctx.run,
        position,
        id,
        error: error.to_string(),
    };
    ctx.report(&error, event).await
}

fn close(
    ctx: &RunContext,
    run: &AggregationRun,
    outcome: RunOutcome,
    started_at: chrono::DateTime<Utc>,
) -> RunSummary {
    let delivered = run.delivered();
    let buffered = run.buffered();

    match &outcome {
        RunOutcome::Completed => {
            tracing::info!(run = %ctx.run, delivered, "run completed");
            ctx.emit(Event::Completed {
                run: ctx.run,
                delivered,
            });
        }
        _ => {
            tracing::info!(run = %ctx.run, delivered, buffered, outcome = ?outcome, "run terminated");
            ctx.emit(Event::Terminated {
                run: ctx.run,
                delivered,
                buffered,
            });
        }
    }

    RunSummary {
        run: ctx.run,
        outcome,
        delivered,
        buffered,
        started_at,
        finished_at: Utc::now(),
    }
}

fn discard(
    ctx: &RunContext,
    run: &AggregationRun,
    started_at: chrono::DateTime<Utc>,
) -> RunSummary {
    tracing::info!(run = %ctx.run, "run discarded after reset");
    ctx.emit(Event::Discarded { run: ctx.run });

    RunSummary {
        run: ctx.run,
        outcome: RunOutcome::Discarded,
        delivered: run.delivered(),
        buffered: run.buffered(),
        started_at,
        finished_at: Utc::now(),
    }
}
