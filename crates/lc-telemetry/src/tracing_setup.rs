use uuid::Uuid;

/// Generate a 32-hex-character trace id.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Generate a 16-hex-character span id.
pub fn generate_span_id() -> String {
    let mut id = Uuid::new_v4().as_simple().to_string();
    id.truncate(16);
    id
}

/// Create a named span for a top-level operation, returning the span and its
/// trace id for log correlation.
pub fn create_operation_span(operation: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        operation = %operation,
    );
    (span, trace_id)
}

/// Create a child span under an existing trace id.
pub fn create_child_span(trace_id: &str, operation: &str) -> tracing::Span {
    tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        operation = %operation,
    )
}

/// Span wrapping one automation run. `run_id`, `case_id` and `phase` are
/// recorded up front so every handler log line carries them.
pub fn create_run_span(run_id: &str, case_id: u64, phase: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span = tracing::info_span!(
        "agent_run",
        trace_id = %trace_id,
        span_id = %generate_span_id(),
        run_id = %run_id,
        case_id = case_id,
        phase = %phase,
    );
    (span, trace_id)
}
