use std::net::SocketAddr;

use crate::console::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: console requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "tablebook_requests_total";

/// Histogram: console request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "tablebook_request_duration_seconds";

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "tablebook_reservations_created_total";

/// Counter: bookings refused for clashing with an active reservation.
/// Labels: source (`precheck` or `store`).
pub const CONFLICTS_TOTAL: &str = "tablebook_conflicts_total";

/// Counter: status changes written. Labels: status.
pub const STATUS_TRANSITIONS_TOTAL: &str = "tablebook_status_transitions_total";

/// Counter: availability searches served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "tablebook_availability_queries_total";

/// Histogram: tables returned per availability search.
pub const AVAILABILITY_RESULTS: &str = "tablebook_availability_results";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "tablebook_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}

/// Short label for a console request.
pub fn request_label(req: &Request) -> &'static str {
    match req {
        Request::Create { .. } => "create",
        Request::Update { .. } => "update",
        Request::Cancel { .. } => "cancel",
        Request::CheckIn { .. } => "check_in",
        Request::NoShow { .. } => "no_show",
        Request::Get { .. } => "get",
        Request::Available { .. } => "available",
        Request::ByCustomer { .. } => "by_customer",
        Request::ForTable { .. } => "for_table",
    }
}
