//! Lightweight metrics helpers for the gateway.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is installed
//! here; whichever recorder the application installs receives the values.
//!
//! Provided metrics:
//! * `ingress_requests_total` (counter, labels: method, status)
//! * `ingress_request_duration_seconds` (histogram, labels: method)
//! * `ingress_backend_not_found_total` (counter)
//! * `ingress_routing_rebuilds_total` (counter, label: outcome)
//! * `ingress_routing_hosts` / `ingress_routing_backends` (gauges)
//!
//! [`RequestTimer`] records the duration on `Drop` so early returns are
//! still measured.
use std::time::Instant;

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const INGRESS_REQUESTS_TOTAL: &str = "ingress_requests_total";
pub const INGRESS_REQUEST_DURATION_SECONDS: &str = "ingress_request_duration_seconds";
pub const INGRESS_BACKEND_NOT_FOUND_TOTAL: &str = "ingress_backend_not_found_total";
pub const INGRESS_ROUTING_REBUILDS_TOTAL: &str = "ingress_routing_rebuilds_total";
pub const INGRESS_ROUTING_HOSTS: &str = "ingress_routing_hosts";
pub const INGRESS_ROUTING_BACKENDS: &str = "ingress_routing_backends";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        INGRESS_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests handled by the gateway."
    );
    describe_histogram!(
        INGRESS_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests handled by the gateway, including the proxied round trip."
    );
    describe_counter!(
        INGRESS_BACKEND_NOT_FOUND_TOTAL,
        Unit::Count,
        "Requests that matched no routing rule."
    );
    describe_counter!(
        INGRESS_ROUTING_REBUILDS_TOTAL,
        Unit::Count,
        "Routing table rebuild attempts by outcome (success / failure)."
    );
    describe_gauge!(
        INGRESS_ROUTING_HOSTS,
        "Number of hosts in the active routing table."
    );
    describe_gauge!(
        INGRESS_ROUTING_BACKENDS,
        "Number of backend rules in the active routing table."
    );
});

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    Lazy::force(&DESCRIBED);
}

pub fn increment_request_total(method: &str, status: u16) {
    counter!(
        INGRESS_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn increment_backend_not_found() {
    counter!(INGRESS_BACKEND_NOT_FOUND_TOTAL).increment(1);
}

pub fn increment_rebuild(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(INGRESS_ROUTING_REBUILDS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_routing_table_size(hosts: usize, backends: usize) {
    gauge!(INGRESS_ROUTING_HOSTS).set(hosts as f64);
    gauge!(INGRESS_ROUTING_BACKENDS).set(backends as f64);
}

/// Records the request duration histogram when dropped.
pub struct RequestTimer {
    method: String,
    start: Instant,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        histogram!(
            INGRESS_REQUEST_DURATION_SECONDS,
            "method" => self.method.clone()
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder the helpers are no-ops; they must not panic.
    #[test]
    fn test_helpers_without_recorder() {
        init_metrics();
        increment_request_total("GET", 200);
        increment_backend_not_found();
        increment_rebuild(true);
        increment_rebuild(false);
        set_routing_table_size(3, 7);
        drop(RequestTimer::new("GET"));
    }
}
