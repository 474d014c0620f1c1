use chrono::{Duration, Utc};

use asahi::config::ObservabilitySettings;
use asahi::telemetry::{InferenceEvent, MetricsCollector};
use asahi::types::{CacheTier, TaskType};

fn collector() -> MetricsCollector {
    MetricsCollector::new(&ObservabilitySettings::default())
}

fn event(model: &str, cost: f64, latency_ms: u64) -> InferenceEvent {
    let mut event = InferenceEvent::new(model);
    event.task_type = TaskType::Faq;
    event.input_tokens = 100;
    event.output_tokens = 50;
    event.total_tokens = 150;
    event.latency_ms = latency_ms;
    event.cost = cost;
    event
}

#[test]
fn recorded_events_show_up_in_totals_and_windows() {
    let collector = collector();
    collector.record_inference(&event("sonnet", 0.01, 120));
    collector.record_inference(&event("sonnet", 0.02, 180));
    collector.record_inference(&event("gpt-4-turbo", 0.05, 250));

    assert_eq!(collector.total_requests(), 3);
    assert!((collector.total_cost() - 0.08).abs() < 1e-9);

    let summary = collector.summary(60);
    assert_eq!(summary.total_requests, 3);
    assert!((summary.total_cost - 0.08).abs() < 1e-9);
    assert_eq!(summary.top_models[0].0, "sonnet");
    assert_eq!(summary.top_models[0].1, 2);
}

#[test]
fn window_excludes_older_events() {
    let collector = collector();
    let mut old = event("sonnet", 0.01, 100);
    old.timestamp = Utc::now() - Duration::hours(2);
    collector.record_inference(&old);
    collector.record_inference(&event("sonnet", 0.02, 100));

    let summary = collector.summary(60);
    assert_eq!(summary.total_requests, 1);

    // The wider window still covers both.
    let wide = collector.summary(60 * 24);
    assert_eq!(wide.total_requests, 2);
}

#[test]
fn cache_events_drive_hit_rate_gauge() {
    let collector = collector();
    collector.record_cache_event(CacheTier::Exact, true, 1.0);
    collector.record_cache_event(CacheTier::Exact, true, 1.0);
    collector.record_cache_event(CacheTier::Exact, false, 1.0);
    collector.record_cache_event(CacheTier::Semantic, false, 4.0);

    let stats = collector.cache_stats();
    let exact = stats.iter().find(|t| t.tier == CacheTier::Exact).unwrap();
    assert_eq!(exact.hits, 2);
    assert_eq!(exact.misses, 1);
    assert!((exact.hit_rate - 2.0 / 3.0).abs() < 1e-9);

    let semantic = stats.iter().find(|t| t.tier == CacheTier::Semantic).unwrap();
    assert_eq!(semantic.hits, 0);
    assert_eq!(semantic.misses, 1);
}

#[test]
fn exposition_carries_the_stable_metric_names() {
    let collector = collector();
    let mut e = event("sonnet", 0.0123, 42);
    e.quality_score = Some(4.1);
    collector.record_inference(&e);
    collector.record_cache_event(CacheTier::Exact, true, 1.0);
    collector.record_cache_event(CacheTier::Semantic, false, 3.0);
    collector.record_batch_event(4, 0.0);
    collector.record_error("provider", "gateway");
    collector.record_savings("caching", 0.01);

    let text = collector.exposition();

    assert!(text.contains("# HELP asahi_requests_total"));
    assert!(text.contains("# TYPE asahi_requests_total counter"));
    assert!(text.contains(
        "asahi_requests_total{model=\"sonnet\",task_type=\"faq\",cache_tier=\"none\"} 1"
    ));
    assert!(text.contains("asahi_cost_dollars_total{model=\"sonnet\"} 0.012300"));
    assert!(text.contains("asahi_savings_dollars_total{phase=\"caching\"} 0.010000"));
    assert!(text.contains("asahi_cache_hits_total{tier=\"exact\"} 1"));
    assert!(text.contains("asahi_cache_misses_total{tier=\"semantic\"} 1"));
    assert!(text.contains("asahi_cache_hit_rate{tier=\"exact\"} 1.0000"));
    assert!(text.contains("asahi_errors_total{error_type=\"provider\",component=\"gateway\"} 1"));
    assert!(text.contains("# TYPE asahi_latency_ms histogram"));
    assert!(text.contains("asahi_latency_ms_bucket{le=\"50\"}"));
    assert!(text.contains("asahi_latency_ms_bucket{le=\"+Inf\"}"));
    assert!(text.contains("asahi_latency_ms_count"));
    assert!(text.contains("asahi_latency_ms_sum"));
    assert!(text.contains("# TYPE asahi_token_count histogram"));
    assert!(text.contains("# TYPE asahi_batch_size histogram"));
    assert!(text.contains("asahi_quality_score{model=\"sonnet\"} 4.1000"));
}

#[test]
fn latency_histogram_buckets_are_cumulative() {
    let collector = collector();
    for latency in [3, 40, 90, 900] {
        collector.record_inference(&event("m", 0.0, latency));
    }
    let text = collector.exposition();
    assert!(text.contains("asahi_latency_ms_bucket{le=\"5\"} 1"));
    assert!(text.contains("asahi_latency_ms_bucket{le=\"50\"} 2"));
    assert!(text.contains("asahi_latency_ms_bucket{le=\"100\"} 3"));
    assert!(text.contains("asahi_latency_ms_bucket{le=\"1000\"} 4"));
    assert!(text.contains("asahi_latency_ms_bucket{le=\"+Inf\"} 4"));
}

#[test]
fn requests_total_never_undercounts_cache_hits() {
    let collector = collector();
    let mut hit = event("sonnet", 0.0, 1);
    hit.cache_tier = CacheTier::Exact;
    collector.record_inference(&hit);
    collector.record_inference(&event("sonnet", 0.01, 100));

    // 1 cache-hit request + 1 fresh request recorded.
    assert_eq!(collector.total_requests(), 2);
}

#[test]
fn prune_removes_points_past_retention() {
    let settings = ObservabilitySettings {
        retention_hours: 1,
        ..ObservabilitySettings::default()
    };
    let collector = MetricsCollector::new(&settings);

    let mut old = event("m", 0.01, 100);
    old.timestamp = Utc::now() - Duration::hours(3);
    collector.record_inference(&old);
    collector.record_inference(&event("m", 0.01, 100));

    // Old event contributes 1 event + 1 latency + 2 token observations.
    let removed = collector.prune();
    assert_eq!(removed, 4);
    assert_eq!(collector.total_requests(), 1);
}

#[test]
fn disabled_collector_records_nothing() {
    let settings = ObservabilitySettings {
        enabled: false,
        ..ObservabilitySettings::default()
    };
    let collector = MetricsCollector::new(&settings);
    collector.record_inference(&event("m", 0.01, 100));
    collector.record_cache_event(CacheTier::Exact, true, 1.0);
    collector.record_error("provider", "gateway");

    assert_eq!(collector.total_requests(), 0);
    assert!(collector.cache_stats().iter().all(|t| t.hits == 0));
    assert!(collector.error_counts().is_empty());
}
