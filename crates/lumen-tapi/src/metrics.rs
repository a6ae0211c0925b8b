//! Observability metrics for the propagation engine.
//!
//! Metrics go through the `metrics` crate facade; install any recorder
//! (Prometheus exporter, test recorder) at startup to collect them. Without a
//! recorder every call is a no-op.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `lumen_events_total` | Counter | `stream`, `result` | Lifecycle events by outcome |
//! | `lumen_duplicate_events_total` | Counter | `stream` | Redeliveries dropped by the deduplicator |
//! | `lumen_propagation_duration_seconds` | Histogram | - | Time spent in one propagation pass |
//! | `lumen_connection_transitions_total` | Counter | `layer`, `to_state` | Persisted connection state changes |
//! | `lumen_service_transitions_total` | Counter | `layer`, `to_state` | Persisted service state changes |
//! | `lumen_entity_failures_total` | Counter | `kind` | Per-entity failures isolated by the propagator |
//! | `lumen_notifications_total` | Counter | `result` | Outbound notifications by publish outcome |
//! | `lumen_pending_paths` | Gauge | - | Computed paths awaiting their result event |

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

use crate::model::{LayerProtocolName, OperationalState};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Lifecycle events by stream and outcome.
    pub const EVENTS_TOTAL: &str = "lumen_events_total";
    /// Counter: Duplicate deliveries dropped.
    pub const DUPLICATE_EVENTS_TOTAL: &str = "lumen_duplicate_events_total";
    /// Histogram: Propagation pass duration in seconds.
    pub const PROPAGATION_DURATION_SECONDS: &str = "lumen_propagation_duration_seconds";
    /// Counter: Connection operational-state transitions.
    pub const CONNECTION_TRANSITIONS_TOTAL: &str = "lumen_connection_transitions_total";
    /// Counter: Service operational-state transitions.
    pub const SERVICE_TRANSITIONS_TOTAL: &str = "lumen_service_transitions_total";
    /// Counter: Entity updates aborted by an error.
    pub const ENTITY_FAILURES_TOTAL: &str = "lumen_entity_failures_total";
    /// Counter: Outbound notifications.
    pub const NOTIFICATIONS_TOTAL: &str = "lumen_notifications_total";
    /// Gauge: Computed paths not yet installed or discarded.
    pub const PENDING_PATHS: &str = "lumen_pending_paths";
}

/// Label keys used across metrics.
pub mod labels {
    /// Inbound stream id.
    pub const STREAM: &str = "stream";
    /// Outcome (processed, duplicate, failed, published, dropped).
    pub const RESULT: &str = "result";
    /// Layer protocol name.
    pub const LAYER: &str = "layer";
    /// Target operational state.
    pub const TO_STATE: &str = "to_state";
    /// Error kind.
    pub const KIND: &str = "kind";
}

/// High-level interface for recording engine metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics;

impl EngineMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records the outcome of one lifecycle event.
    pub fn record_event(&self, stream: &str, result: &str) {
        counter!(
            names::EVENTS_TOTAL,
            labels::STREAM => stream.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records a dropped redelivery.
    pub fn record_duplicate(&self, stream: &str) {
        counter!(
            names::DUPLICATE_EVENTS_TOTAL,
            labels::STREAM => stream.to_string(),
        )
        .increment(1);
    }

    /// Records a propagation pass duration.
    pub fn observe_propagation(&self, duration: Duration) {
        histogram!(names::PROPAGATION_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records a persisted connection state change.
    pub fn record_connection_transition(&self, layer: LayerProtocolName, to: OperationalState) {
        counter!(
            names::CONNECTION_TRANSITIONS_TOTAL,
            labels::LAYER => layer.as_label(),
            labels::TO_STATE => to.as_label(),
        )
        .increment(1);
    }

    /// Records a persisted service state change.
    pub fn record_service_transition(&self, layer: LayerProtocolName, to: OperationalState) {
        counter!(
            names::SERVICE_TRANSITIONS_TOTAL,
            labels::LAYER => layer.as_label(),
            labels::TO_STATE => to.as_label(),
        )
        .increment(1);
    }

    /// Records an entity update aborted by an error of `kind`.
    pub fn record_entity_failure(&self, kind: &'static str) {
        counter!(names::ENTITY_FAILURES_TOTAL, labels::KIND => kind).increment(1);
    }

    /// Records an outbound notification outcome.
    pub fn record_notification(&self, result: &'static str) {
        counter!(names::NOTIFICATIONS_TOTAL, labels::RESULT => result).increment(1);
    }

    /// Sets the number of computed paths held by the path computation driver.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_pending_paths(&self, count: usize) {
        gauge!(names::PENDING_PATHS).set(count as f64);
    }
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

/// Creates a timing guard for one propagation pass.
#[must_use]
pub fn time_propagation() -> TimingGuard<impl FnOnce(Duration)> {
    TimingGuard::new(|duration| EngineMetrics::new().observe_propagation(duration))
}
