//! Prometheus metrics for kubesee
//!
//! Counter names carry the configured `metricsNamePrefix`, so registration
//! happens once at startup after the config is loaded. Recording helpers are
//! no-ops until then, which keeps the hot paths free of init concerns.

use std::sync::OnceLock;

use prometheus::{
    register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};

use crate::error::{ExporterError, Result};

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Reasons an event can be discarded, used as the `reason` label.
pub const REASON_STALE: &str = "stale";
pub const REASON_QUEUE_FULL: &str = "queue_full";
pub const REASON_UNKNOWN_RECEIVER: &str = "unknown_receiver";
pub const REASON_SINK_ERROR: &str = "sink_error";

/// All kubesee metrics
pub struct Metrics {
    /// Events accepted from the watch stream
    pub events_received: Counter,

    /// Events discarded (by reason)
    pub events_discarded: CounterVec,

    /// Events delivered to a sink (by receiver)
    pub events_sent: CounterVec,

    /// Watch stream interruptions
    pub watch_errors: Counter,
}

impl Metrics {
    /// Register all metrics under the given name prefix. Call once at
    /// startup; later calls return the existing instance.
    pub fn init(prefix: &str) -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            events_received: register_counter!(
                format!("{prefix}events_received_total"),
                "Total events accepted from the watch stream"
            )
            .map_err(|e| ExporterError::Metrics(format!("events_received: {e}")))?,

            events_discarded: register_counter_vec!(
                format!("{prefix}events_discarded_total"),
                "Total events discarded",
                &["reason"]
            )
            .map_err(|e| ExporterError::Metrics(format!("events_discarded: {e}")))?,

            events_sent: register_counter_vec!(
                format!("{prefix}events_sent_total"),
                "Total events delivered to sinks",
                &["receiver"]
            )
            .map_err(|e| ExporterError::Metrics(format!("events_sent: {e}")))?,

            watch_errors: register_counter!(
                format!("{prefix}watch_errors_total"),
                "Total watch stream interruptions"
            )
            .map_err(|e| ExporterError::Metrics(format!("watch_errors: {e}")))?,
        };

        let _ = METRICS.set(metrics);
        METRICS
            .get()
            .ok_or_else(|| ExporterError::Metrics("metrics initialization raced".to_string()))
    }

    /// The global instance, if `init` has run.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }
}

/// Record an accepted event, if metrics are initialized.
pub fn try_record_received() {
    if let Some(m) = Metrics::get() {
        m.events_received.inc();
    }
}

/// Record a discarded event, if metrics are initialized.
pub fn try_record_discarded(reason: &str) {
    if let Some(m) = Metrics::get() {
        m.events_discarded.with_label_values(&[reason]).inc();
    }
}

/// Record a delivered event, if metrics are initialized.
pub fn try_record_sent(receiver: &str) {
    if let Some(m) = Metrics::get() {
        m.events_sent.with_label_values(&[receiver]).inc();
    }
}

/// Record a watch interruption, if metrics are initialized.
pub fn try_record_watch_error() {
    if let Some(m) = Metrics::get() {
        m.watch_errors.inc();
    }
}

/// Gather all registered metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}
