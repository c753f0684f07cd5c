use std::sync::Arc;

use lc_telemetry::metrics::{global_metrics, names, MetricsCollector};
use lc_telemetry::tracing_setup::{create_child_span, create_operation_span, create_run_span};

#[test]
fn global_metrics_is_a_singleton() {
    assert!(std::ptr::eq(global_metrics(), global_metrics()));
}

#[test]
fn json_export_shapes() {
    let m = MetricsCollector::with_defaults();
    m.increment_counter(names::TASKS_CREATED_TOTAL, &[("phase", "intake")]);
    m.increment_counter_by(names::TASKS_CREATED_TOTAL, &[("phase", "intake")], 2);
    m.set_gauge(names::TASKS_ACTIVE, 3);

    let json = m.export_json();
    assert_eq!(json["counters"]["tasks_created_total{phase=\"intake\"}"], 3);
    assert_eq!(json["gauges"]["tasks_active"], 3);
    assert_eq!(
        json["histograms"]["agent_run_duration_seconds"]["count"],
        0
    );
}

#[test]
fn prometheus_histogram_buckets_are_cumulative() {
    let m = MetricsCollector::with_defaults();
    m.record_histogram(names::AGENT_RUN_DURATION_SECONDS, 0.003);
    m.record_histogram(names::AGENT_RUN_DURATION_SECONDS, 2.0);
    let out = m.export_prometheus();
    assert!(out.contains("agent_run_duration_seconds_bucket{le=\"0.005\"} 1"));
    assert!(out.contains("agent_run_duration_seconds_bucket{le=\"5\"} 2"));
    assert!(out.contains("agent_run_duration_seconds_bucket{le=\"+Inf\"} 2"));
}

#[tokio::test]
async fn concurrent_counter_updates() {
    let m = Arc::new(MetricsCollector::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let m = Arc::clone(&m);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                m.increment_counter(names::HOOK_FAILURES_TOTAL, &[("hook", "stamp")]);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(
        m.get_counter(names::HOOK_FAILURES_TOTAL, &[("hook", "stamp")]),
        800
    );
}

#[test]
fn spans_can_be_entered() {
    let (parent, trace_id) = create_operation_span("transition_case");
    let _p = parent.enter();
    let child = create_child_span(&trace_id, "run_automation");
    let _c = child.enter();
    let (run, _) = create_run_span("RUN-5-0001", 5, "negotiation");
    let _r = run.enter();
}
