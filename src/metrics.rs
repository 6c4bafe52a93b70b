//! Lightweight metrics helpers for Conduit.
//!
//! Thin wrappers around the `metrics` crate macros. No exporter is embedded;
//! an application that wants the numbers installs any compatible recorder
//! before serving. Without one every call is a no-op.
//!
//! Provided metrics:
//! * `conduit_requests_total` (counter; service, method, status)
//! * `conduit_request_duration_seconds` (histogram; service, method)
//! * `conduit_backend_requests_total` (counter; service, backend, status)
//! * `conduit_backend_request_duration_seconds` (histogram; service, backend)
//! * `conduit_rejections_total` (counter; service, reason)
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const CONDUIT_REQUESTS_TOTAL: &str = "conduit_requests_total";
pub const CONDUIT_REQUEST_DURATION_SECONDS: &str = "conduit_request_duration_seconds";
pub const CONDUIT_BACKEND_REQUESTS_TOTAL: &str = "conduit_backend_requests_total";
pub const CONDUIT_BACKEND_REQUEST_DURATION_SECONDS: &str =
    "conduit_backend_request_duration_seconds";
pub const CONDUIT_REJECTIONS_TOTAL: &str = "conduit_rejections_total";

/// Status label used when a backend call produced no response at all.
pub const BACKEND_FAILURE_STATUS: u16 = 599;

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        CONDUIT_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests answered by the gateway."
    );
    describe_histogram!(
        CONDUIT_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests answered by the gateway."
    );
    describe_counter!(
        CONDUIT_BACKEND_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to backend services."
    );
    describe_histogram!(
        CONDUIT_BACKEND_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests forwarded to backend services."
    );
    describe_counter!(
        CONDUIT_REJECTIONS_TOTAL,
        Unit::Count,
        "Requests answered by the gateway itself with an error (by reason)."
    );
});

/// Increment the total request counter for an inbound gateway request.
pub fn increment_request_total(service: &str, method: &str, status: u16) {
    counter!(
        CONDUIT_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(service: &str, method: &str, duration: Duration) {
    histogram!(
        CONDUIT_REQUEST_DURATION_SECONDS,
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment total count of proxied backend requests.
pub fn increment_backend_request_total(service: &str, backend: &str, status: u16) {
    counter!(
        CONDUIT_BACKEND_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed backend request duration.
pub fn record_backend_request_duration(service: &str, backend: &str, duration: Duration) {
    histogram!(
        CONDUIT_BACKEND_REQUEST_DURATION_SECONDS,
        "service" => service.to_string(),
        "backend" => backend.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count a request the gateway refused or could not forward.
pub fn increment_rejections(service: &str, reason: &'static str) {
    counter!(
        CONDUIT_REJECTIONS_TOTAL,
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// RAII helper measuring backend request duration.
pub struct BackendRequestTimer {
    start: Instant,
    service: String,
    backend: String,
}

impl BackendRequestTimer {
    pub fn new(service: &str, backend: &str) -> Self {
        Self {
            start: Instant::now(),
            service: service.to_string(),
            backend: backend.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for BackendRequestTimer {
    fn drop(&mut self) {
        record_backend_request_duration(&self.service, &self.backend, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIPTIONS);
    tracing::debug!("Conduit metric descriptions registered");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        init_metrics();
        init_metrics();
        increment_request_total("orders", "GET", 200);
        record_request_duration("orders", "GET", Duration::from_millis(3));
        increment_backend_request_total("orders", "http://h1:9000", BACKEND_FAILURE_STATUS);
        increment_rejections("orders", "rate_limit_exceeded");
    }

    #[test]
    fn test_backend_timer_measures() {
        let timer = BackendRequestTimer::new("orders", "http://h1:9000");
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
    }
}
