//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pingpong_pings_total` (counter): pings sent, by endpoint and outcome
//! - `pingpong_responses_total` (counter): responder replies, by status
//! - `pingpong_messages_sent_total` (counter): successful enqueues
//! - `pingpong_messages_processed_total` (counter): successful deletes
//! - `pingpong_empty_polls_total` (counter): polls that returned nothing
//! - `pingpong_queue_errors_total` (counter): failed queue calls, by operation
//! - `pingpong_processing_seconds` (histogram): simulated processing time
//!
//! Recording without an installed exporter is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve a Prometheus scrape endpoint on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_ping(endpoint: &str, outcome: &str) {
    metrics::counter!(
        "pingpong_pings_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_response(status: u16) {
    metrics::counter!("pingpong_responses_total", "status" => status.to_string()).increment(1);
}

pub fn record_message_sent() {
    metrics::counter!("pingpong_messages_sent_total").increment(1);
}

pub fn record_message_processed(elapsed: Duration) {
    metrics::counter!("pingpong_messages_processed_total").increment(1);
    metrics::histogram!("pingpong_processing_seconds").record(elapsed.as_secs_f64());
}

pub fn record_empty_poll() {
    metrics::counter!("pingpong_empty_polls_total").increment(1);
}

pub fn record_queue_error(operation: &'static str) {
    metrics::counter!("pingpong_queue_errors_total", "operation" => operation).increment(1);
}
