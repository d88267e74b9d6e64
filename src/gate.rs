//! Visibility gate: keep a loading indicator up for a minimum duration.
//!
//! The indicator is hidden only once both conditions hold:
//! - the data it covers is ready (container received or failed)
//! - the minimum duration has elapsed since the gate was armed
//!
//! Whichever condition completes second triggers the hide. The gate never
//! blocks anything else; it only decides when to call
//! [`PresentationSink::on_loading_visibility_changed`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::sink::PresentationSink;

/// Where a gate is in its show/hide cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    /// Indicator not shown
    Hidden,
    /// Indicator shown; neither data nor minimum duration is in
    Armed,
    /// Data is ready; waiting for the minimum duration to elapse
    Waiting,
    /// Minimum duration elapsed; hides as soon as data is ready
    ReadyToHide,
}

/// Conditions of one visibility cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateState {
    /// When the gate was armed
    pub armed_at: Instant,
    /// Minimum time the indicator stays visible
    pub min_duration: Duration,
    /// Whether the data signal arrived
    pub data_ready: bool,
    /// Whether the minimum duration elapsed
    pub timer_elapsed: bool,
}

impl GateState {
    /// Fresh cycle armed at `armed_at`
    pub fn new(armed_at: Instant, min_duration: Duration) -> Self {
        Self {
            armed_at,
            min_duration,
            data_ready: false,
            timer_elapsed: false,
        }
    }

    /// Phase implied by the two conditions
    pub fn phase(&self) -> GatePhase {
        match (self.data_ready, self.timer_elapsed) {
            (false, false) => GatePhase::Armed,
            (true, false) => GatePhase::Waiting,
            (false, true) => GatePhase::ReadyToHide,
            // Never observed: the gate hides as soon as both are set
            (true, true) => GatePhase::Hidden,
        }
    }

    /// Record the data signal; returns whether to hide now
    pub fn set_data_ready(&mut self) -> bool {
        self.data_ready = true;
        self.should_hide()
    }

    /// Record the elapsed minimum duration; returns whether to hide now
    pub fn set_timer_elapsed(&mut self) -> bool {
        self.timer_elapsed = true;
        self.should_hide()
    }

    /// Both conditions hold
    pub fn should_hide(&self) -> bool {
        self.data_ready && self.timer_elapsed
    }

    /// Instant before which the indicator must stay visible
    pub fn earliest_hide(&self) -> Instant {
        self.armed_at + self.min_duration
    }
}

/// Token identifying one arm cycle
///
/// Signals carrying the token of an older cycle are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GateCycle(u64);

struct GateInner {
    cycle: u64,
    state: Option<GateState>,
    timer: Option<JoinHandle<()>>,
}

/// Minimum-visible-duration gate for a loading indicator (cloneable - shared state)
#[derive(Clone)]
pub struct VisibilityGate {
    inner: Arc<Mutex<GateInner>>,
    sink: Arc<dyn PresentationSink>,
    phase_tx: Arc<watch::Sender<GatePhase>>,
}

impl VisibilityGate {
    /// Create a hidden gate reporting to `sink`
    pub fn new(sink: Arc<dyn PresentationSink>) -> Self {
        let (phase_tx, _rx) = watch::channel(GatePhase::Hidden);
        Self {
            inner: Arc::new(Mutex::new(GateInner {
                cycle: 0,
                state: None,
                timer: None,
            })),
            sink,
            phase_tx: Arc::new(phase_tx),
        }
    }

    /// Show the indicator and start a new cycle of at least `min_duration`
    ///
    /// Arming while a cycle is live replaces it: the old timer is cancelled
    /// and signals for the old cycle are ignored from then on.
    pub async fn arm(&self, min_duration: Duration) -> GateCycle {
        let mut inner = self.inner.lock().await;

        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        let was_visible = inner.state.is_some();

        inner.cycle += 1;
        let cycle = inner.cycle;
        let state = GateState::new(Instant::now(), min_duration);
        inner.state = Some(state);

        let gate = self.clone();
        let hide_at = state.earliest_hide();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(hide_at).await;
            gate.timer_fired(cycle).await;
        }));

        tracing::debug!(cycle, min_ms = min_duration.as_millis() as u64, "loading gate armed");
        if !was_visible {
            self.sink.on_loading_visibility_changed(true);
        }
        self.phase_tx.send_replace(state.phase());

        GateCycle(cycle)
    }

    /// Signal that the covered data is ready (or failed)
    ///
    /// Hides the indicator now if the minimum duration already elapsed,
    /// otherwise when it does. Returns whether this call hid the indicator.
    pub async fn notify_data_ready(&self, cycle: GateCycle) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.cycle != cycle.0 {
            tracing::debug!(cycle = cycle.0, current = inner.cycle, "ignoring data signal for stale cycle");
            return false;
        }
        let Some(state) = inner.state.as_mut() else {
            return false;
        };
        if state.data_ready {
            return false;
        }

        if state.set_data_ready() {
            self.hide(&mut inner);
            true
        } else {
            let phase = state.phase();
            tracing::debug!(cycle = cycle.0, "data ready, holding indicator for minimum duration");
            self.phase_tx.send_replace(phase);
            false
        }
    }

    /// Hide immediately and end the live cycle, if any
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state.is_some() {
            self.hide(&mut inner);
        }
    }

    /// Current phase
    pub fn phase(&self) -> GatePhase {
        *self.phase_tx.borrow()
    }

    /// Snapshot of the live cycle's conditions
    pub async fn state(&self) -> Option<GateState> {
        self.inner.lock().await.state
    }

    /// Wait until the indicator is hidden
    pub async fn wait_hidden(&self) {
        let mut rx = self.phase_tx.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|phase| *phase == GatePhase::Hidden).await;
    }

    async fn timer_fired(&self, cycle: u64) {
        let mut inner = self.inner.lock().await;
        if inner.cycle != cycle {
            return;
        }
        // This task is the timer; drop its handle rather than abort it
        inner.timer = None;
        let Some(state) = inner.state.as_mut() else {
            return;
        };

        if state.set_timer_elapsed() {
            self.hide(&mut inner);
        } else {
            let phase = state.phase();
            tracing::debug!(cycle, "minimum duration elapsed, waiting for data");
            self.phase_tx.send_replace(phase);
        }
    }

    fn hide(&self, inner: &mut GateInner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        if let Some(state) = inner.state.take() {
            tracing::debug!(
                cycle = inner.cycle,
                visible_ms = state.armed_at.elapsed().as_millis() as u64,
                "loading gate hidden"
            );
        }
        self.sink.on_loading_visibility_changed(false);
        self.phase_tx.send_replace(GatePhase::Hidden);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingSink;
    use tokio_test::{assert_pending, assert_ready};

    const MIN: Duration = Duration::from_millis(1000);

    fn gate() -> (VisibilityGate, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let gate = VisibilityGate::new(Arc::clone(&sink) as Arc<dyn PresentationSink>);
        (gate, sink)
    }

    #[test]
    fn state_phases() {
        let mut state = GateState::new(Instant::now(), MIN);
        assert_eq!(state.phase(), GatePhase::Armed);
        assert!(!state.set_timer_elapsed());
        assert_eq!(state.phase(), GatePhase::ReadyToHide);
        assert!(state.set_data_ready());

        let mut state = GateState::new(Instant::now(), MIN);
        assert!(!state.set_data_ready());
        assert_eq!(state.phase(), GatePhase::Waiting);
        assert!(state.set_timer_elapsed());
        assert_eq!(state.earliest_hide(), state.armed_at + MIN);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_data_is_held_until_minimum_duration() {
        let (gate, sink) = gate();
        let start = Instant::now();

        let cycle = gate.arm(MIN).await;
        assert_eq!(gate.phase(), GatePhase::Armed);
        assert!(!gate.notify_data_ready(cycle).await);
        assert_eq!(gate.phase(), GatePhase::Waiting);

        gate.wait_hidden().await;

        let visibility = sink.visibility();
        assert_eq!(visibility.len(), 2);
        assert_eq!(visibility[0], (true, start));
        assert!(!visibility[1].0);
        assert_eq!(visibility[1].1 - start, MIN);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_data_hides_on_arrival() {
        let (gate, sink) = gate();
        let start = Instant::now();

        let cycle = gate.arm(MIN).await;
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(gate.phase(), GatePhase::ReadyToHide);

        assert!(gate.notify_data_ready(cycle).await);
        assert_eq!(gate.phase(), GatePhase::Hidden);

        let visibility = sink.visibility();
        assert_eq!(visibility.len(), 2);
        assert_eq!(visibility[1], (false, start + Duration::from_millis(2000)));
    }

    #[tokio::test(start_paused = true)]
    async fn stays_visible_until_data_arrives() {
        let (gate, sink) = gate();
        let _cycle = gate.arm(MIN).await;

        let mut hidden = tokio_test::task::spawn(gate.wait_hidden());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_pending!(hidden.poll());
        assert_eq!(sink.visibility().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hides_exactly_once_per_cycle() {
        let (gate, sink) = gate();
        let cycle = gate.arm(MIN).await;

        gate.notify_data_ready(cycle).await;
        assert!(!gate.notify_data_ready(cycle).await);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!gate.notify_data_ready(cycle).await);

        let hides = sink.visibility().iter().filter(|(v, _)| !v).count();
        assert_eq!(hides, 1);
        assert!(gate.state().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_cycle() {
        let (gate, sink) = gate();
        let start = Instant::now();

        let first = gate.arm(MIN).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        let second = gate.arm(MIN).await;
        assert_ne!(first, second);

        // Data for the old cycle is ignored
        assert!(!gate.notify_data_ready(first).await);
        gate.notify_data_ready(second).await;

        // The first timer would have fired at 1000; the second fires at 1600
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(gate.phase(), GatePhase::Waiting);

        gate.wait_hidden().await;
        let visibility = sink.visibility();
        // Shown once, hidden once
        assert_eq!(visibility.len(), 2);
        assert_eq!(visibility[1], (false, start + Duration::from_millis(1600)));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_hides_and_cancels_timer() {
        let (gate, sink) = gate();
        let cycle = gate.arm(MIN).await;

        gate.reset().await;
        assert_eq!(gate.phase(), GatePhase::Hidden);
        let mut hidden = tokio_test::task::spawn(gate.wait_hidden());
        assert_ready!(hidden.poll());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!gate.notify_data_ready(cycle).await);
        assert_eq!(sink.visibility().len(), 2);

        // Reset on a hidden gate does nothing
        gate.reset().await;
        assert_eq!(sink.visibility().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_hides_with_data() {
        let (gate, _sink) = gate();
        let cycle = gate.arm(Duration::ZERO).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(gate.notify_data_ready(cycle).await);
    }
}
