use std::net::SocketAddr;

// ── Ledger activity ─────────────────────────────────────────────

/// Counter: block/release/disable requests. Labels: operation, outcome.
pub const TRANSITIONS_TOTAL: &str = "slotledger_transitions_total";

/// Counter: availability records provisioned.
pub const SLOTS_CREATED_TOTAL: &str = "slotledger_slots_created_total";

/// Counter: provisioning requests rejected because a segment already existed.
pub const DUPLICATE_SLOTS_TOTAL: &str = "slotledger_duplicate_slots_total";

/// Histogram: grid segments touched by one request.
pub const SEGMENTS_PER_REQUEST: &str = "slotledger_segments_per_request";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotledger_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotledger_wal_compactions_total";

/// Gauge: records held by the ledger.
pub const RECORDS_STORED: &str = "slotledger_records_stored";

// ── Outcome labels ──────────────────────────────────────────────

/// Transition applied and committed.
pub const OUTCOME_COMMITTED: &str = "committed";
/// Precondition failed on the snapshot read.
pub const OUTCOME_REJECTED: &str = "rejected";
/// Precondition held but a concurrent writer changed a row first.
pub const OUTCOME_CONFLICT: &str = "conflict";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
