//! Metrics emitted as tracing events.

use relay_ports::MetricsSink;
use tracing::debug;

/// Metrics sink that logs every emission at debug level under the
/// `relay::metrics` target.
#[derive(Debug, Default)]
pub struct TracingMetrics;

fn format_labels(labels: &[(&'static str, &str)]) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

impl MetricsSink for TracingMetrics {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        debug!(target: "relay::metrics", metric = name, labels = %format_labels(labels), "counter");
    }

    fn set_gauge(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
        debug!(target: "relay::metrics", metric = name, value, labels = %format_labels(labels), "gauge");
    }

    fn observe_histogram(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]) {
        debug!(target: "relay::metrics", metric = name, value, labels = %format_labels(labels), "histogram");
    }
}
