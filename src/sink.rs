//! Presentation sinks
//!
//! A [`PresentationSink`] is the only way the loader touches a display surface.
//! The aggregator calls [`on_container_title`](PresentationSink::on_container_title)
//! and [`on_item_ready`](PresentationSink::on_item_ready), the visibility gate
//! calls [`on_loading_visibility_changed`](PresentationSink::on_loading_visibility_changed).

use std::io::Write;
use std::sync::Mutex;

use crate::error::ErrorKind;

/// Receiver of everything a load wants to show
///
/// Methods are called from the task driving a run and must not block for long.
/// `on_item_ready` is called exactly once per delivered item, in container order.
pub trait PresentationSink: Send + Sync {
    /// The container title is known
    fn on_container_title(&self, title: &str);

    /// The next item, in container order, is ready to be shown
    fn on_item_ready(&self, id: &str, text: &str);

    /// A load error occurred
    fn on_error(&self, kind: ErrorKind, detail: &str);

    /// The loading indicator should be shown (`true`) or hidden (`false`)
    fn on_loading_visibility_changed(&self, visible: bool);

    /// Everything shown so far should be cleared
    fn on_reset(&self) {}
}

/// Sink that only logs through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn on_container_title(&self, title: &str) {
        tracing::info!(title, "container title");
    }

    fn on_item_ready(&self, id: &str, text: &str) {
        tracing::info!(id, text, "item ready");
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        tracing::error!(kind = %kind, detail, "load error");
    }

    fn on_loading_visibility_changed(&self, visible: bool) {
        tracing::debug!(visible, "loading indicator");
    }
}

/// Sink rendering a load as plain text lines
///
/// The title is written as `# title`, each item as `[id] text` and each error
/// as `error (kind): detail`. Write failures are logged and otherwise ignored.
pub struct WriterSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Render into `out`
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn line(&self, args: std::fmt::Arguments<'_>) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{args}") {
            tracing::warn!(error = %e, "failed to write to presentation output");
        }
    }
}

impl<W: Write + Send> PresentationSink for WriterSink<W> {
    fn on_container_title(&self, title: &str) {
        self.line(format_args!("# {title}"));
    }

    fn on_item_ready(&self, id: &str, text: &str) {
        self.line(format_args!("[{id}] {text}"));
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        self.line(format_args!("error ({kind}): {detail}"));
    }

    fn on_loading_visibility_changed(&self, visible: bool) {
        tracing::trace!(visible, "loading indicator (not rendered)");
    }
}
