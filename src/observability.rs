use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking requests processed. Labels: kind, status.
pub const BOOKINGS_TOTAL: &str = "mentorbook_bookings_total";

/// Histogram: create-booking latency in seconds (reserve + charge).
pub const BOOKING_DURATION_SECONDS: &str = "mentorbook_booking_duration_seconds";

/// Counter: gateway charges that failed or timed out.
pub const PAYMENT_FAILURES_TOTAL: &str = "mentorbook_payment_failures_total";

/// Counter: group-session joins admitted.
pub const GROUP_JOINS_TOTAL: &str = "mentorbook_group_joins_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: pending holds released by the reaper.
pub const HOLDS_REAPED_TOTAL: &str = "mentorbook_holds_reaped_total";

/// Counter: cancellations, by actor role.
pub const CANCELLATIONS_TOTAL: &str = "mentorbook_cancellations_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
