use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all pipeline metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload for whatever embeds this crate.
pub fn init_metrics(channels: &[String]) -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    register_metrics(channels);
    handle
}

/// Pre-register every series so they appear in the scrape payload before
/// the first real write. Channel-scoped series carry the same `channel`
/// label the pipeline writes with.
fn register_metrics(channels: &[String]) {
    counter!("feed_messages_total").absolute(0);
    counter!("feed_reconnects_total").absolute(0);
    counter!("parse_errors_total").absolute(0);
    counter!("events_deduped_total").absolute(0);
    counter!("events_classified_total").absolute(0);
    counter!("rule_fires_total").absolute(0);
    counter!("rule_errors_total").absolute(0);

    for channel in channels {
        counter!("alerts_dispatched_total", "channel" => channel.clone()).absolute(0);
        counter!("alerts_failed_total", "channel" => channel.clone()).absolute(0);
        counter!("alerts_dropped_total", "channel" => channel.clone()).absolute(0);
        counter!("deliveries_rate_limited_total", "channel" => channel.clone()).absolute(0);
        gauge!("dispatch_queue_depth", "channel" => channel.clone()).set(0.0);
    }

    // Histogram is lazily created on first record; force creation.
    histogram!("pipeline_latency_seconds").record(0.0);
}
