use std::net::SocketAddr;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: bookings created (always Pending).
pub const BOOKINGS_CREATED_TOTAL: &str = "toolbook_bookings_created_total";

/// Counter: committed status transitions. Labels: to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "toolbook_status_transitions_total";

/// Counter: requests refused because an accepted booking overlaps. Labels: op.
pub const DATES_CONFLICTS_TOTAL: &str = "toolbook_dates_conflicts_total";

/// Counter: status changes refused by the state machine.
pub const INVALID_TRANSITIONS_TOTAL: &str = "toolbook_invalid_transitions_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "toolbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "toolbook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "toolbook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
