//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lanchat_connections_total` (counter): accepted/dialed connections by class
//! - `lanchat_active_connections` (gauge): registered connections by class
//! - `lanchat_broadcasts_total` (counter): broadcast requests processed
//! - `lanchat_broadcast_fanout` (histogram): recipients per broadcast
//! - `lanchat_broadcast_writes_total` (counter): per-recipient writes by outcome
//! - `lanchat_evictions_total` (counter): remotes removed after a failed write
//! - `lanchat_decode_failures_total` (counter): remote chunks that failed to decode
//! - `lanchat_bytes_relayed_total` (counter): payload bytes written to peers

use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(class: &'static str) {
    metrics::counter!("lanchat_connections_total", "class" => class).increment(1);
}

pub fn record_registered(class: &'static str, count: usize) {
    metrics::gauge!("lanchat_active_connections", "class" => class).set(count as f64);
}

pub fn record_broadcast(recipients: usize) {
    metrics::counter!("lanchat_broadcasts_total").increment(1);
    metrics::histogram!("lanchat_broadcast_fanout").record(recipients as f64);
}

pub fn record_broadcast_write(ok: bool, bytes: usize) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("lanchat_broadcast_writes_total", "outcome" => outcome).increment(1);
    if ok {
        metrics::counter!("lanchat_bytes_relayed_total").increment(bytes as u64);
    }
}

pub fn record_eviction() {
    metrics::counter!("lanchat_evictions_total").increment(1);
}

pub fn record_decode_failure() {
    metrics::counter!("lanchat_decode_failures_total").increment(1);
}
