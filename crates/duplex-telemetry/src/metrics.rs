//! Prometheus metrics for the messaging layer.
//!
//! All metrics follow the naming convention: `duplex_<area>_<metric>_<unit>`
//!
//! Counters are updated whether or not [`register_metrics`] was called;
//! registration only makes them visible to [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

/// `role` label for client-side metrics.
pub const ROLE_CLIENT: &str = "client";
/// `role` label for server-side metrics.
pub const ROLE_SERVER: &str = "server";
/// `channel` label for the broadcast channel.
pub const CHANNEL_BROADCAST: &str = "broadcast";
/// `channel` label for the request/reply channel.
pub const CHANNEL_REQUEST: &str = "request";

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // MESSAGE METRICS
    // =========================================================================

    /// Envelopes written to a channel
    pub static ref MESSAGES_SENT: CounterVec = CounterVec::new(
        Opts::new("duplex_messages_sent_total", "Envelopes sent"),
        &["role", "channel"]  // role: client/server, channel: broadcast/request
    ).expect("metric creation failed");

    /// Envelopes read from a channel
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("duplex_messages_received_total", "Envelopes received"),
        &["role", "channel"]
    ).expect("metric creation failed");

    // =========================================================================
    // SECURITY METRICS
    // =========================================================================

    /// Authentication failures while decrypting (possible tampering)
    pub static ref DECRYPT_FAILURES: CounterVec = CounterVec::new(
        Opts::new("duplex_decrypt_failures_total", "Payloads that failed decryption"),
        &["role"]
    ).expect("metric creation failed");

    // =========================================================================
    // ERROR METRICS
    // =========================================================================

    /// Handler invocations that failed or panicked
    pub static ref HANDLER_ERRORS: Counter = Counter::new(
        "duplex_handler_errors_total",
        "Event handlers that returned an error or panicked"
    ).expect("metric creation failed");

    /// Client connection attempts
    pub static ref CONNECT_ATTEMPTS: CounterVec = CounterVec::new(
        Opts::new("duplex_connect_attempts_total", "Client connection attempts"),
        &["outcome"]  // outcome: success/failed
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Fails with `MetricsInit` when called twice in one process.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Messages
        Box::new(MESSAGES_SENT.clone()),
        Box::new(MESSAGES_RECEIVED.clone()),
        // Security
        Box::new(DECRYPT_FAILURES.clone()),
        // Errors
        Box::new(HANDLER_ERRORS.clone()),
        Box::new(CONNECT_ATTEMPTS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Count one envelope sent by `role` on `channel`.
pub fn record_sent(role: &str, channel: &str) {
    MESSAGES_SENT.with_label_values(&[role, channel]).inc();
}

/// Count one envelope received by `role` on `channel`.
pub fn record_received(role: &str, channel: &str) {
    MESSAGES_RECEIVED.with_label_values(&[role, channel]).inc();
}

/// Count one failed authentication on the `role` side.
pub fn record_decrypt_failure(role: &str) {
    DECRYPT_FAILURES.with_label_values(&[role]).inc();
}

/// Count one connection attempt; `success` selects the outcome label.
pub fn record_connect_attempt(success: bool) {
    let outcome = if success { "success" } else { "failed" };
    CONNECT_ATTEMPTS.with_label_values(&[outcome]).inc();
}
