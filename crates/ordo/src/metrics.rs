//! Minimal metrics emission helpers.
//!
//! Metrics go out as structured tracing events by default. A test sink can be
//! installed to capture emissions in unit tests.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use ordo_core::ContextId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(u64),
    Histogram(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricLabel {
    pub key: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: MetricValue,
    pub labels: Vec<MetricLabel>,
}

impl MetricEvent {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.key == key)
            .map(|label| label.value.as_str())
    }
}

pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&self, event: MetricEvent) {
        let (kind, value) = match event.value {
            MetricValue::Counter(value) => ("counter", value),
            MetricValue::Gauge(value) => ("gauge", value),
            MetricValue::Histogram(value) => ("histogram", value),
        };
        tracing::info!(
            target: "metrics",
            metric = event.name,
            kind,
            value,
            labels = ?event.labels
        );
    }
}

static METRIC_SINK: OnceLock<RwLock<Arc<dyn MetricSink>>> = OnceLock::new();

fn sink() -> Arc<dyn MetricSink> {
    METRIC_SINK
        .get_or_init(|| RwLock::new(Arc::new(TracingSink)))
        .read()
        .expect("metrics sink lock poisoned")
        .clone()
}

pub fn set_sink(sink: Arc<dyn MetricSink>) {
    let lock = METRIC_SINK.get_or_init(|| RwLock::new(Arc::new(TracingSink)));
    *lock.write().expect("metrics sink lock poisoned") = sink;
}

fn emit(name: &'static str, value: MetricValue, labels: Vec<MetricLabel>) {
    sink().record(MetricEvent {
        name,
        value,
        labels,
    });
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn context_label(context: &ContextId) -> Vec<MetricLabel> {
    vec![MetricLabel {
        key: "context",
        value: context.to_string(),
    }]
}

pub fn envelope_accepted(context: &ContextId, placement: &'static str) {
    let mut labels = context_label(context);
    labels.push(MetricLabel {
        key: "placement",
        value: placement.to_string(),
    });
    emit("envelope_accepted", MetricValue::Counter(1), labels);
}

pub fn command_executed(context: &ContextId, execution: Duration, waiting: Duration) {
    emit(
        "command_executed",
        MetricValue::Counter(1),
        context_label(context),
    );
    emit(
        "command_execution_duration",
        MetricValue::Histogram(duration_ms(execution)),
        context_label(context),
    );
    emit(
        "command_wait_duration",
        MetricValue::Histogram(duration_ms(waiting)),
        context_label(context),
    );
}

pub fn command_failed(context: &ContextId) {
    emit(
        "command_failed",
        MetricValue::Counter(1),
        context_label(context),
    );
}

pub fn command_canceled(context: &ContextId) {
    emit(
        "command_canceled",
        MetricValue::Counter(1),
        context_label(context),
    );
}

pub fn command_skipped(context: &ContextId) {
    emit(
        "command_skipped",
        MetricValue::Counter(1),
        context_label(context),
    );
}

pub fn batch_completed(context: &ContextId, tickets: usize) {
    emit(
        "batch_completed",
        MetricValue::Histogram(tickets as u64),
        context_label(context),
    );
}

pub fn coordinator_started(context: &ContextId) {
    emit(
        "coordinator_started",
        MetricValue::Counter(1),
        context_label(context),
    );
}

pub fn coordinator_stopped(context: &ContextId) {
    emit(
        "coordinator_stopped",
        MetricValue::Counter(1),
        context_label(context),
    );
}

pub fn ownership_retry(context: &ContextId) {
    emit(
        "ownership_retry",
        MetricValue::Counter(1),
        context_label(context),
    );
}

pub fn set_coordinators(count: usize) {
    emit("coordinators", MetricValue::Gauge(count as u64), Vec::new());
}
