//! Shared test helpers: a scripted in-memory transport and a recording sink.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Config, ResourceConfig};
use crate::error::{ErrorKind, TransportError};
use crate::sink::PresentationSink;
use crate::transport::{FetchResponse, Transport};

/// Container body in wire shape
pub(crate) fn story_json(title: &str, chapters: &[&str], serial: Option<bool>) -> String {
    let mut doc = serde_json::json!({ "title": title, "chapters": chapters });
    if let Some(serial) = serial {
        doc["serial"] = serde_json::Value::Bool(serial);
    }
    doc.to_string()
}

/// Item body in wire shape
pub(crate) fn chapter_json(id: &str, text: &str) -> String {
    serde_json::json!({ "id": id, "text": text }).to_string()
}

/// Resource name of an item under the default template
pub(crate) fn chapter_resource(id: &str) -> String {
    ResourceConfig::default().item_resource(id)
}

/// Default config with a short loader duration for tests
pub(crate) fn test_config(min_visible: Duration) -> Config {
    let mut config = Config::default();
    config.loader.min_visible = min_visible;
    config
}

#[derive(Clone)]
struct Route {
    delay: Duration,
    outcome: Result<FetchResponse, TransportError>,
}

/// Transport answering from a fixed script after a per-resource delay
///
/// Delays use `tokio::time`, so tests running with a paused clock observe
/// exact, deterministic timing.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: HashMap<String, Route>,
    issued: Mutex<Vec<(String, Instant)>>,
    answered: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `resource` with `response` after `delay_ms`
    pub(crate) fn respond(mut self, resource: &str, response: FetchResponse, delay_ms: u64) -> Self {
        self.routes.insert(
            resource.to_string(),
            Route {
                delay: Duration::from_millis(delay_ms),
                outcome: Ok(response),
            },
        );
        self
    }

    /// Fail `resource` at the transport level after `delay_ms`
    pub(crate) fn fail(mut self, resource: &str, error: TransportError, delay_ms: u64) -> Self {
        self.routes.insert(
            resource.to_string(),
            Route {
                delay: Duration::from_millis(delay_ms),
                outcome: Err(error),
            },
        );
        self
    }

    /// Story plus one chapter per `(id, delay_ms)`
    pub(crate) fn story(
        title: &str,
        story_delay_ms: u64,
        chapters: &[(&str, u64)],
        serial: Option<bool>,
    ) -> Self {
        let ids: Vec<&str> = chapters.iter().map(|(id, _)| *id).collect();
        let mut transport = Self::new().respond(
            "story",
            FetchResponse::ok(story_json(title, &ids, serial)),
            story_delay_ms,
        );
        for (id, delay) in chapters {
            transport = transport.respond(
                &chapter_resource(id),
                FetchResponse::ok(chapter_json(id, &format!("text of {id}"))),
                *delay,
            );
        }
        transport
    }

    /// Resources in the order their fetches were issued
    pub(crate) fn requested(&self) -> Vec<String> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    /// When `resource` was first requested
    pub(crate) fn issued_at(&self, resource: &str) -> Option<Instant> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, at)| *at)
    }

    /// When `resource` was first answered
    pub(crate) fn answered_at(&self, resource: &str) -> Option<Instant> {
        self.answered
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, at)| *at)
    }

    /// Largest number of fetches that were in flight at the same time
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, resource: &str) -> Result<FetchResponse, TransportError> {
        self.issued
            .lock()
            .unwrap()
            .push((resource.to_string(), Instant::now()));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let route = self.routes.get(resource).cloned().unwrap_or(Route {
            delay: Duration::ZERO,
            outcome: Ok(FetchResponse::not_found("no such resource")),
        });
        tokio::time::sleep(route.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.answered
            .lock()
            .unwrap()
            .push((resource.to_string(), Instant::now()));
        route.outcome
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// One call made on a [`RecordingSink`]
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SinkCall {
    Title(String),
    Item { id: String, text: String },
    Error { kind: ErrorKind, detail: String },
    Visibility { visible: bool, at: Instant },
    Reset,
}

/// Sink remembering every call in order
#[derive(Default)]
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn item_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Item { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Error { kind, detail } => Some((kind, detail)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn visibility(&self) -> Vec<(bool, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Visibility { visible, at } => Some((visible, at)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn title(&self) -> Option<String> {
        self.calls().into_iter().find_map(|c| match c {
            SinkCall::Title(t) => Some(t),
            _ => None,
        })
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PresentationSink for RecordingSink {
    fn on_container_title(&self, title: &str) {
        self.push(SinkCall::Title(title.to_string()));
    }

    fn on_item_ready(&self, id: &str, text: &str) {
        self.push(SinkCall::Item {
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        self.push(SinkCall::Error {
            kind,
            detail: detail.to_string(),
        });
    }

    fn on_loading_visibility_changed(&self, visible: bool) {
        self.push(SinkCall::Visibility {
            visible,
            at: Instant::now(),
        });
    }

    fn on_reset(&self) {
        self.push(SinkCall::Reset);
    }
}
