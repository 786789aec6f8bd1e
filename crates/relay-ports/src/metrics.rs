//! Metrics sink contract.
//!
//! Emission is synchronous and must not block; a backend is expected to
//! buffer or aggregate in memory.

use parking_lot::Mutex;

/// Metric names emitted by the relay core.
pub mod names {
    /// Counter: frames rejected by the daemon for rate limiting.
    pub const RATE_LIMITED: &str = "rate_limited";
    /// Counter: rate-limited frames written again.
    pub const RESEND_ATTEMPTED: &str = "resend_attempted";
    /// Counter: rate-limited frames dropped after the attempt bound.
    pub const RESEND_ABANDONED: &str = "resend_abandoned";
    /// Counter: relayable messages received, labelled by sender role.
    pub const RELAYABLE_MESSAGES: &str = "relayable_messages";
    /// Counter: command results handed to the messenger, labelled by status.
    pub const MESSAGES_DISPATCHED: &str = "messages_dispatched";
    /// Counter: inbound lines dropped before dispatch.
    pub const FRAMES_DROPPED: &str = "frames_dropped";
    /// Counter: correlated requests that timed out, labelled by kind.
    pub const CALLBACK_TIMEOUTS: &str = "callback_timeouts";
    /// Counter: safety number changes handled, labelled by outcome.
    pub const SAFETY_NUMBER_CHANGES: &str = "safety_number_changes";
    /// Histogram: seconds between a send and its send results.
    pub const SEND_ROUNDTRIP_SECONDS: &str = "send_roundtrip_seconds";
    /// Gauge: outstanding correlated requests.
    pub const PENDING_CALLBACKS: &str = "pending_callbacks";
}

/// Sink for counters, gauges and histograms.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, &str)]);

    fn set_gauge(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]);

    fn observe_histogram(&self, name: &'static str, value: f64, labels: &[(&'static str, &str)]);
}

/// A sink that discards everything.
#[derive(Debug, Default)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn increment_counter(&self, _name: &'static str, _labels: &[(&'static str, &str)]) {}

    fn set_gauge(&self, _name: &'static str, _value: f64, _labels: &[(&'static str, &str)]) {}

    fn observe_histogram(&self, _name: &'static str, _value: f64, _labels: &[(&'static str, &str)]) {
    }
}

/// One recorded metric emission.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Counter {
        name: &'static str,
        labels: Vec<(&'static str, String)>,
    },
    Gauge {
        name: &'static str,
        value: f64,
    },
    Histogram {
        name: &'static str,
        value: f64,
    },
}

/// A sink that records every emission for tests.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    /// Number of increments of the named counter.
    pub fn counter(&self, name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, MetricEvent::Counter { name: n, .. } if *n == name))
            .count()
    }

    /// Values observed for the named histogram.
    pub fn histogram(&self, name: &str) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MetricEvent::Histogram { name: n, value } if *n == name => Some(*value),
                _ => None,
            })
            .collect()
    }
}

fn owned_labels(labels: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
    labels.iter().map(|(k, v)| (*k, v.to_string())).collect()
}

impl MetricsSink for RecordingMetrics {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        self.events.lock().push(MetricEvent::Counter {
            name,
            labels: owned_labels(labels),
        });
    }

    fn set_gauge(&self, name: &'static str, value: f64, _labels: &[(&'static str, &str)]) {
        self.events.lock().push(MetricEvent::Gauge { name, value });
    }

    fn observe_histogram(&self, name: &'static str, value: f64, _labels: &[(&'static str, &str)]) {
        self.events
            .lock()
            .push(MetricEvent::Histogram { name, value });
    }
}
