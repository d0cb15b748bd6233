use tracing::trace;

// Trace-level counters for log-based dashboards; the Prometheus recorder
// installed in main covers the HTTP-level series.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "retrace.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn lookup_elapsed(operation: &'static str, elapsed_ms: u128) {
    trace!(
        target = "retrace.metrics",
        operation = operation,
        elapsed_ms = elapsed_ms as u64,
        "lookup_elapsed"
    );
}
