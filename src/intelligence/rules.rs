use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;

use crate::errors::RuleError;
use crate::models::{Alert, AlertRule, ClassifiedEvent, RuleKind, Side};
use crate::services::formatter;

/// Per-wallet history entries are capped in addition to the age bound.
const MAX_WALLET_HISTORY: usize = 256;
const COOLDOWN_SWEEP_WATERMARK: usize = 8_192;

#[derive(Debug, Clone)]
struct HistoryEntry {
    coin: String,
    side: Side,
    notional: Decimal,
    at: Instant,
}

/// Evaluates the configured rules against each classified event.
///
/// Rules are evaluated independently and in configured order; one event may
/// satisfy several rules and produce several alerts. A misconfigured rule
/// is logged and skipped, never aborting evaluation of the rest.
///
/// Cooldown state is keyed per rule per (wallet, coin), so a rule firing
/// for one pair does not silence it for others. The history buffer serves
/// rule context only and is kept separate from the deduplicator's window.
pub struct RuleEngine {
    rules: Vec<AlertRule>,
    state: EngineState,
}

/// Mutable evaluation state, split from the rule list so the hot path can
/// borrow the rules immutably while updating cooldowns and history.
struct EngineState {
    cooldowns: HashMap<(String, String, String), Instant>,
    history: HashMap<String, VecDeque<HistoryEntry>>,
    history_horizon: Duration,
    max_cooldown: Duration,
}

impl RuleEngine {
    pub fn new(rules: Vec<AlertRule>, history_horizon: Duration) -> Self {
        let max_cooldown = rules
            .iter()
            .map(|r| r.cooldown)
            .max()
            .unwrap_or(Duration::from_secs(300));
        Self {
            rules,
            state: EngineState {
                cooldowns: HashMap::new(),
                history: HashMap::new(),
                history_horizon,
                max_cooldown,
            },
        }
    }

    /// Evaluate all rules against one event, producing zero or more alerts.
    pub fn evaluate(&mut self, event: &ClassifiedEvent, now: Instant) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }

            let matched = match self.state.matches(rule, event, now) {
                Ok(m) => m,
                Err(e) => {
                    counter!("rule_errors_total").increment(1);
                    tracing::warn!(rule = %rule.id, error = %e, "Rule evaluation failed, skipping rule");
                    continue;
                }
            };
            if !matched {
                continue;
            }

            if self.state.in_cooldown(rule, event, now) {
                tracing::debug!(
                    rule = %rule.id,
                    wallet = %event.wallet(),
                    coin = %event.coin(),
                    "Rule matched but pair is in cooldown"
                );
                continue;
            }

            self.state.record_fire(rule, event, now);
            counter!("rule_fires_total").increment(1);
            tracing::info!(
                rule = %rule.id,
                wallet = %event.wallet(),
                coin = %event.coin(),
                tier = %event.tier,
                notional = %event.event.notional_usd,
                "Rule fired"
            );

            alerts.push(Alert {
                rule_id: rule.id.clone(),
                event: event.clone(),
                message: formatter::render_alert(&rule.id, event),
                channels: rule.channels.clone(),
                created_at: Utc::now(),
            });
        }

        self.state.push_history(event, now);
        alerts
    }
}

impl EngineState {
    fn matches(
        &self,
        rule: &AlertRule,
        event: &ClassifiedEvent,
        now: Instant,
    ) -> Result<bool, RuleError> {
        match &rule.kind {
            RuleKind::MinTier { tier } => Ok(event.tier >= *tier),

            RuleKind::WatchedWallet { wallets } => {
                Ok(wallets.iter().any(|w| w.eq_ignore_ascii_case(event.wallet())))
            }

            RuleKind::HighFrequency { min_events, window } => {
                if *min_events == 0 || window.is_zero() {
                    return Err(RuleError::Misconfigured {
                        rule_id: rule.id.clone(),
                        reason: "min_events and window must be positive".into(),
                    });
                }
                // The current event counts toward the total; history holds
                // prior events only.
                let prior = self.recent_entries(event.wallet(), *window, now).count();
                Ok(prior + 1 >= *min_events)
            }

            RuleKind::VolumeThreshold { min_notional, window } => {
                if window.is_zero() {
                    return Err(RuleError::Misconfigured {
                        rule_id: rule.id.clone(),
                        reason: "window must be positive".into(),
                    });
                }
                let prior: Decimal = self
                    .recent_entries(event.wallet(), *window, now)
                    .map(|e| e.notional)
                    .sum();
                Ok(prior + event.event.notional_usd >= *min_notional)
            }

            RuleKind::PositionFlip => {
                let flipped = self
                    .history
                    .get(event.wallet())
                    .and_then(|entries| entries.iter().rev().find(|e| e.coin == event.coin()))
                    .map(|prev| prev.side == event.event.side.opposite())
                    .unwrap_or(false);
                Ok(flipped)
            }
        }
    }

    fn recent_entries(
        &self,
        wallet: &str,
        window: Duration,
        now: Instant,
    ) -> impl Iterator<Item = &HistoryEntry> {
        self.history
            .get(wallet)
            .into_iter()
            .flatten()
            .filter(move |e| now.duration_since(e.at) < window)
    }

    fn in_cooldown(&self, rule: &AlertRule, event: &ClassifiedEvent, now: Instant) -> bool {
        let key = (
            rule.id.clone(),
            event.wallet().to_string(),
            event.coin().to_string(),
        );
        self.cooldowns
            .get(&key)
            .map(|fired_at| now.duration_since(*fired_at) < rule.cooldown)
            .unwrap_or(false)
    }

    fn record_fire(&mut self, rule: &AlertRule, event: &ClassifiedEvent, now: Instant) {
        let key = (
            rule.id.clone(),
            event.wallet().to_string(),
            event.coin().to_string(),
        );
        self.cooldowns.insert(key, now);

        if self.cooldowns.len() > COOLDOWN_SWEEP_WATERMARK {
            let max_cooldown = self.max_cooldown;
            self.cooldowns
                .retain(|_, fired_at| now.duration_since(*fired_at) < max_cooldown);
        }
    }

    fn push_history(&mut self, event: &ClassifiedEvent, now: Instant) {
        let entries = self.history.entry(event.wallet().to_string()).or_default();
        entries.push_back(HistoryEntry {
            coin: event.coin().to_string(),
            side: event.event.side,
            notional: event.event.notional_usd,
            at: now,
        });

        let horizon = self.history_horizon;
        while let Some(front) = entries.front() {
            if entries.len() > MAX_WALLET_HISTORY || now.duration_since(front.at) >= horizon {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tier, TradeEvent};

    fn rule(id: &str, kind: RuleKind, cooldown: Duration) -> AlertRule {
        AlertRule {
            id: id.into(),
            kind,
            cooldown,
            channels: vec!["telegram".into()],
            enabled: true,
        }
    }

    fn event(wallet: &str, coin: &str, side: Side, notional: i64, tier: Tier) -> ClassifiedEvent {
        ClassifiedEvent {
            event: TradeEvent {
                wallet: wallet.into(),
                coin: coin.into(),
                side,
                size: Decimal::ONE,
                price: Decimal::from(notional),
                notional_usd: Decimal::from(notional),
                timestamp: Utc::now(),
                source_seq: 0,
                raw_id: format!("{wallet}-{coin}-{notional}"),
            },
            tier,
        }
    }

    #[test]
    fn test_min_tier_rule_fires_at_or_above() {
        let rules = vec![rule(
            "whale_position",
            RuleKind::MinTier { tier: Tier::Whale },
            Duration::ZERO,
        )];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));
        let now = Instant::now();

        let whale = event("0xa", "BTC", Side::Buy, 1_500_000, Tier::Whale);
        assert_eq!(engine.evaluate(&whale, now).len(), 1);

        let large = event("0xa", "ETH", Side::Buy, 200_000, Tier::Large);
        assert!(engine.evaluate(&large, now).is_empty());
    }

    #[test]
    fn test_cooldown_is_per_wallet_coin_pair() {
        let rules = vec![rule(
            "whale_position",
            RuleKind::MinTier { tier: Tier::Whale },
            Duration::from_secs(300),
        )];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));
        let t0 = Instant::now();

        let first = event("0xa", "BTC", Side::Buy, 2_000_000, Tier::Whale);
        assert_eq!(engine.evaluate(&first, t0).len(), 1);

        // Same pair 10s later: suppressed.
        let second = event("0xa", "BTC", Side::Sell, 3_000_000, Tier::Whale);
        assert!(engine.evaluate(&second, t0 + Duration::from_secs(10)).is_empty());

        // Different coin is an independent pair.
        let other_coin = event("0xa", "ETH", Side::Buy, 2_000_000, Tier::Whale);
        assert_eq!(engine.evaluate(&other_coin, t0 + Duration::from_secs(11)).len(), 1);

        // After the cooldown the original pair fires again.
        let later = event("0xa", "BTC", Side::Buy, 2_000_000, Tier::Whale);
        assert_eq!(engine.evaluate(&later, t0 + Duration::from_secs(301)).len(), 1);
    }

    #[test]
    fn test_multiple_rules_fire_for_one_event() {
        let rules = vec![
            rule("whale_position", RuleKind::MinTier { tier: Tier::Whale }, Duration::ZERO),
            rule(
                "watched",
                RuleKind::WatchedWallet {
                    wallets: vec!["0xA".into()],
                },
                Duration::ZERO,
            ),
        ];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));

        let whale = event("0xa", "BTC", Side::Buy, 1_500_000, Tier::Whale);
        let alerts = engine.evaluate(&whale, Instant::now());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].rule_id, "whale_position");
        assert_eq!(alerts[1].rule_id, "watched");
    }

    #[test]
    fn test_high_frequency_counts_current_event() {
        let rules = vec![rule(
            "high_frequency",
            RuleKind::HighFrequency {
                min_events: 3,
                window: Duration::from_secs(60),
            },
            Duration::ZERO,
        )];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));
        let t0 = Instant::now();

        let e = || event("0xa", "BTC", Side::Buy, 5_000, Tier::Notable);
        assert!(engine.evaluate(&e(), t0).is_empty());
        assert!(engine.evaluate(&e(), t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(engine.evaluate(&e(), t0 + Duration::from_secs(2)).len(), 1);
    }

    #[test]
    fn test_volume_threshold_sums_window() {
        let rules = vec![rule(
            "unusual_volume",
            RuleKind::VolumeThreshold {
                min_notional: Decimal::from(50_000),
                window: Duration::from_secs(300),
            },
            Duration::ZERO,
        )];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));
        let t0 = Instant::now();

        assert!(engine
            .evaluate(&event("0xa", "BTC", Side::Buy, 20_000, Tier::Medium), t0)
            .is_empty());
        assert!(engine
            .evaluate(
                &event("0xa", "BTC", Side::Buy, 20_000, Tier::Medium),
                t0 + Duration::from_secs(1)
            )
            .is_empty());
        // 20k + 20k prior + 15k current crosses 50k.
        assert_eq!(
            engine
                .evaluate(
                    &event("0xa", "BTC", Side::Buy, 15_000, Tier::Medium),
                    t0 + Duration::from_secs(2)
                )
                .len(),
            1
        );
    }

    #[test]
    fn test_position_flip_needs_opposite_prior_side() {
        let rules = vec![rule("position_flip", RuleKind::PositionFlip, Duration::ZERO)];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));
        let t0 = Instant::now();

        assert!(engine
            .evaluate(&event("0xa", "BTC", Side::Buy, 10_000, Tier::Medium), t0)
            .is_empty());
        // Same side again: no flip.
        assert!(engine
            .evaluate(
                &event("0xa", "BTC", Side::Buy, 10_000, Tier::Medium),
                t0 + Duration::from_secs(1)
            )
            .is_empty());
        // Opposite side: flip.
        assert_eq!(
            engine
                .evaluate(
                    &event("0xa", "BTC", Side::Sell, 10_000, Tier::Medium),
                    t0 + Duration::from_secs(2)
                )
                .len(),
            1
        );
    }

    #[test]
    fn test_misconfigured_rule_is_isolated() {
        let rules = vec![
            rule(
                "broken",
                RuleKind::HighFrequency {
                    min_events: 0,
                    window: Duration::from_secs(60),
                },
                Duration::ZERO,
            ),
            rule("whale_position", RuleKind::MinTier { tier: Tier::Whale }, Duration::ZERO),
        ];
        let mut engine = RuleEngine::new(rules, Duration::from_secs(600));

        let whale = event("0xa", "BTC", Side::Buy, 1_500_000, Tier::Whale);
        let alerts = engine.evaluate(&whale, Instant::now());
        // The broken rule is skipped; the healthy one still fires.
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "whale_position");
    }

    #[test]
    fn test_disabled_rule_never_fires() {
        let mut disabled = rule("whale_position", RuleKind::MinTier { tier: Tier::Whale }, Duration::ZERO);
        disabled.enabled = false;
        let mut engine = RuleEngine::new(vec![disabled], Duration::from_secs(600));

        let whale = event("0xa", "BTC", Side::Buy, 1_500_000, Tier::Whale);
        assert!(engine.evaluate(&whale, Instant::now()).is_empty());
    }
}
