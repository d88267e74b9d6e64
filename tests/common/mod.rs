//! Shared helpers for integration tests

#![allow(dead_code)]

pub mod fixtures;

use ordered_loader::{Config, ErrorKind, PresentationSink};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use wiremock::MockServer;

/// Config pointing at a mock server, with the given minimum loader time
pub fn config_for(server: &MockServer, min_visible: Duration) -> Config {
    let mut config = Config::default();
    config.transport.base_url = format!("{}/", server.uri());
    config.transport.request_timeout = Duration::from_secs(5);
    config.loader.min_visible = min_visible;
    config
}

/// One call made on a [`RecordingSink`]
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Title(String),
    Item(String, String),
    Error(ErrorKind, String),
    Visibility(bool, Instant),
    Reset,
}

/// Sink remembering every call in order
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<Call>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn items(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Item(id, text) => Some((id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.items().into_iter().map(|(id, _)| id).collect()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Error(kind, detail) => Some((kind, detail)),
                _ => None,
            })
            .collect()
    }

    pub fn hidden_at(&self) -> Option<Instant> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Visibility(false, at) => Some(at),
            _ => None,
        })
    }

    pub fn shown_at(&self) -> Option<Instant> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Visibility(true, at) => Some(at),
            _ => None,
        })
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PresentationSink for RecordingSink {
    fn on_container_title(&self, title: &str) {
        self.push(Call::Title(title.to_string()));
    }

    fn on_item_ready(&self, id: &str, text: &str) {
        self.push(Call::Item(id.to_string(), text.to_string()));
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        self.push(Call::Error(kind, detail.to_string()));
    }

    fn on_loading_visibility_changed(&self, visible: bool) {
        self.push(Call::Visibility(visible, Instant::now()));
    }

    fn on_reset(&self) {
        self.push(Call::Reset);
    }
}
