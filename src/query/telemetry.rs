use std::time::Instant;

/// Log target carrying one JSON line per native query execution.
pub const METRICS_TARGET: &str = "nexus_linq::metrics";

/// Emits the bench line for a finished terminal call and warns when it ran
/// longer than `slow_query_ms` (0 disables the warning).
pub(crate) fn record_execution(collection: &str, op: &str, started: Instant, rows: usize, slow_query_ms: u64) {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let line = serde_json::json!({
        "bench": "query",
        "op": op,
        "collection": collection,
        "duration_ms": duration_ms,
        "result_count": rows,
    });
    log::info!(target: METRICS_TARGET, "{line}");
    if slow_query_ms > 0 && duration_ms >= slow_query_ms {
        log::warn!("slow query on '{collection}': {op} took {duration_ms}ms over {rows} rows");
    }
}
