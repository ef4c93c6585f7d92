use metrics::{counter, histogram};
use std::time::Instant;

use crate::config::{AppConfig, Thresholds};
use crate::ingestion::normalizer::Normalizer;
use crate::intelligence::classifier::classify;
use crate::intelligence::dedup::Deduplicator;
use crate::intelligence::rules::RuleEngine;
use crate::models::{Alert, AlertRule, Tier};

/// The synchronous hot path: normalize -> dedup -> classify -> rules.
///
/// Runs inline on the single consumer task fed by the connection manager,
/// so events keep arrival order and none of the owned state (dedup window,
/// cooldowns, history) needs locking. No I/O happens here; delivery is the
/// dispatcher's job.
pub struct Pipeline {
    normalizer: Normalizer,
    dedup: Deduplicator,
    thresholds: Thresholds,
    engine: RuleEngine,
}

impl Pipeline {
    pub fn new(config: &AppConfig, rules: Vec<AlertRule>) -> Self {
        Self {
            normalizer: Normalizer::new(),
            dedup: Deduplicator::new(config.dedup_horizon),
            thresholds: config.thresholds,
            engine: RuleEngine::new(rules, config.history_horizon),
        }
    }

    /// One pass through the pipeline for one raw feed frame. Returns the
    /// alerts to dispatch; parse failures drop the frame and return none.
    pub fn process_raw(&mut self, raw: &str, now: Instant) -> Vec<Alert> {
        let start = Instant::now();

        let events = match self.normalizer.normalize(raw) {
            Ok(events) => events,
            Err(e) => {
                counter!("parse_errors_total").increment(1);
                tracing::warn!(error = %e, "Dropping unparseable feed frame");
                return Vec::new();
            }
        };

        let mut alerts = Vec::new();
        for event in events {
            if !self.dedup.accept(&event, now) {
                counter!("events_deduped_total").increment(1);
                tracing::debug!(raw_id = %event.raw_id, "Duplicate event suppressed");
                continue;
            }

            let classified = classify(event, &self.thresholds);
            if classified.tier == Tier::None {
                tracing::debug!(
                    wallet = %classified.wallet(),
                    notional = %classified.event.notional_usd,
                    "Event below notable threshold, skipping"
                );
                continue;
            }

            counter!("events_classified_total").increment(1);
            tracing::info!(
                wallet = %classified.wallet(),
                coin = %classified.coin(),
                side = %classified.event.side,
                notional = %classified.event.notional_usd,
                tier = %classified.tier,
                "Trade classified"
            );

            alerts.extend(self.engine.evaluate(&classified, now));
        }

        histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());
        alerts
    }
}
