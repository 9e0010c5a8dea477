//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hop_proxy_relays_total` (counter): relays by outcome
//! - `hop_proxy_relay_bytes_total` (counter): body bytes delivered to clients
//! - `hop_proxy_relay_duration_seconds` (histogram): relay wall time
//!
//! Recording is a no-op until a recorder is installed, so the engine can
//! record unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::forward::RelayError;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Label for a relay outcome.
pub fn outcome_label(result: &Result<u64, RelayError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    }
}

/// Record one finished relay.
pub fn record_relay(result: &Result<u64, RelayError>, started: Instant) {
    let bytes = match result {
        Ok(written) => *written,
        Err(e) => e.bytes_written(),
    };

    counter!("hop_proxy_relays_total", "outcome" => outcome_label(result)).increment(1);
    counter!("hop_proxy_relay_bytes_total").increment(bytes);
    histogram!("hop_proxy_relay_duration_seconds").record(started.elapsed().as_secs_f64());
}
