//! Observability for landcase services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: counters, gauges and histograms with Prometheus and JSON export
//! - **Tracing**: trace/span id generation and operation spans used to
//!   correlate every automation run

pub mod logging;
pub mod metrics;
pub mod tracing_setup;
