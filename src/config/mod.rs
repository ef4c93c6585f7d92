use rust_decimal::Decimal;
use std::env;
use std::time::Duration;

use crate::models::{AlertRule, RuleKind, Tier};

const DEFAULT_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

/// Ascending USD thresholds for tier classification. Inclusive lower
/// bounds: an event exactly at a threshold takes the higher tier.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub notable: Decimal,
    pub medium: Decimal,
    pub large: Decimal,
    pub whale: Decimal,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            notable: Decimal::from(1_000),
            medium: Decimal::from(10_000),
            large: Decimal::from(100_000),
            whale: Decimal::from(1_000_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: String,
    pub rate_capacity: f64,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub rate_capacity: f64,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub auth_header: Option<String>,
    pub rate_capacity: f64,
    pub refill_per_sec: f64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Feed
    pub feed_ws_url: String,
    pub watched_wallets: Vec<String>,
    pub liveness_timeout: Duration,
    pub ping_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,

    // Pipeline
    pub thresholds: Thresholds,
    pub dedup_horizon: Duration,
    pub history_horizon: Duration,

    // Dispatch
    pub dispatch_queue_capacity: usize,
    pub delivery_max_attempts: u32,
    pub rule_cooldown: Duration,

    // Channels (enabled when fully configured)
    pub discord: Option<DiscordConfig>,
    pub telegram: Option<TelegramConfig>,
    pub webhook: Option<WebhookConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let wallets_raw = env::var("WATCHED_WALLETS").unwrap_or_default();
        let watched_wallets: Vec<String> = wallets_raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let thresholds = Thresholds {
            notable: env_decimal("NOTABLE_THRESHOLD_USD", "1000")?,
            medium: env_decimal("MEDIUM_THRESHOLD_USD", "10000")?,
            large: env_decimal("LARGE_THRESHOLD_USD", "100000")?,
            whale: env_decimal("WHALE_THRESHOLD_USD", "1000000")?,
        };

        let discord = env::var("DISCORD_WEBHOOK_URL").ok().map(|url| DiscordConfig {
            webhook_url: url,
            username: env::var("DISCORD_USERNAME").unwrap_or_else(|_| "hyperwatch".into()),
            rate_capacity: env_f64("DISCORD_RATE_CAPACITY", 10.0),
            refill_per_sec: env_f64("DISCORD_RATE_REFILL_PER_SEC", 0.5),
        });

        let telegram = match (env::var("TELEGRAM_BOT_TOKEN").ok(), env::var("TELEGRAM_CHAT_ID").ok()) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id,
                rate_capacity: env_f64("TELEGRAM_RATE_CAPACITY", 20.0),
                refill_per_sec: env_f64("TELEGRAM_RATE_REFILL_PER_SEC", 0.5),
            }),
            _ => None,
        };

        let webhook = env::var("WEBHOOK_URL").ok().map(|url| WebhookConfig {
            url,
            auth_header: env::var("WEBHOOK_AUTH_HEADER").ok(),
            rate_capacity: env_f64("WEBHOOK_RATE_CAPACITY", 30.0),
            refill_per_sec: env_f64("WEBHOOK_RATE_REFILL_PER_SEC", 1.0),
        });

        let config = Self {
            feed_ws_url: env::var("FEED_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.into()),
            watched_wallets,
            liveness_timeout: Duration::from_secs(env_u64("LIVENESS_TIMEOUT_SECS", 30)),
            ping_interval: Duration::from_secs(env_u64("PING_INTERVAL_SECS", 25)),
            reconnect_base: Duration::from_secs(env_u64("RECONNECT_BASE_SECS", 2)),
            reconnect_max: Duration::from_secs(env_u64("RECONNECT_MAX_SECS", 60)),
            thresholds,
            dedup_horizon: Duration::from_secs(env_u64("DEDUP_HORIZON_SECS", 60)),
            history_horizon: Duration::from_secs(env_u64("HISTORY_HORIZON_SECS", 600)),
            dispatch_queue_capacity: env_u64("DISPATCH_QUEUE_CAPACITY", 100) as usize,
            delivery_max_attempts: env_u64("DELIVERY_MAX_ATTEMPTS", 3) as u32,
            rule_cooldown: Duration::from_secs(env_u64("RULE_COOLDOWN_SECS", 300)),
            discord,
            telegram,
            webhook,
        };

        config.validate()?;
        Ok(config)
    }

    /// Startup-only validation. Anything caught here is fatal; nothing in
    /// the running pipeline ever re-validates configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.watched_wallets.is_empty() {
            anyhow::bail!("WATCHED_WALLETS must list at least one wallet address");
        }

        let t = &self.thresholds;
        if !(t.notable < t.medium && t.medium < t.large && t.large < t.whale) {
            anyhow::bail!(
                "thresholds must ascend strictly: notable={} medium={} large={} whale={}",
                t.notable, t.medium, t.large, t.whale
            );
        }
        if t.notable < Decimal::ZERO {
            anyhow::bail!("thresholds must be non-negative");
        }

        if self.enabled_channels().is_empty() {
            anyhow::bail!(
                "no notification channel configured: set DISCORD_WEBHOOK_URL, \
                 TELEGRAM_BOT_TOKEN + TELEGRAM_CHAT_ID, or WEBHOOK_URL"
            );
        }

        for (name, capacity, refill) in self.channel_rates() {
            if capacity < 1.0 || refill <= 0.0 {
                anyhow::bail!("invalid rate limit for channel {name}: capacity={capacity} refill={refill}");
            }
        }

        if self.dispatch_queue_capacity == 0 {
            anyhow::bail!("DISPATCH_QUEUE_CAPACITY must be at least 1");
        }
        if self.delivery_max_attempts == 0 {
            anyhow::bail!("DELIVERY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(())
    }

    /// Names of channels with complete credentials.
    pub fn enabled_channels(&self) -> Vec<String> {
        let mut channels = Vec::new();
        if self.discord.is_some() {
            channels.push("discord".to_string());
        }
        if self.telegram.is_some() {
            channels.push("telegram".to_string());
        }
        if self.webhook.is_some() {
            channels.push("webhook".to_string());
        }
        channels
    }

    fn channel_rates(&self) -> Vec<(&'static str, f64, f64)> {
        let mut rates = Vec::new();
        if let Some(d) = &self.discord {
            rates.push(("discord", d.rate_capacity, d.refill_per_sec));
        }
        if let Some(t) = &self.telegram {
            rates.push(("telegram", t.rate_capacity, t.refill_per_sec));
        }
        if let Some(w) = &self.webhook {
            rates.push(("webhook", w.rate_capacity, w.refill_per_sec));
        }
        rates
    }

    /// Default rule set, mirroring the four tier rules plus the activity
    /// rules. All rules target every enabled channel.
    pub fn default_rules(&self) -> Vec<AlertRule> {
        let channels = self.enabled_channels();
        let tier_rule = |id: &str, tier: Tier| AlertRule {
            id: id.to_string(),
            kind: RuleKind::MinTier { tier },
            cooldown: self.rule_cooldown,
            channels: channels.clone(),
            enabled: true,
        };

        vec![
            tier_rule("whale_position", Tier::Whale),
            tier_rule("large_position", Tier::Large),
            tier_rule("medium_position", Tier::Medium),
            tier_rule("notable_position", Tier::Notable),
            AlertRule {
                id: "high_frequency".into(),
                kind: RuleKind::HighFrequency {
                    min_events: 10,
                    window: Duration::from_secs(60),
                },
                cooldown: self.rule_cooldown,
                channels: channels.clone(),
                enabled: true,
            },
            AlertRule {
                id: "unusual_volume".into(),
                kind: RuleKind::VolumeThreshold {
                    min_notional: Decimal::from(50_000),
                    window: Duration::from_secs(300),
                },
                cooldown: self.rule_cooldown,
                channels: channels.clone(),
                enabled: true,
            },
            AlertRule {
                id: "position_flip".into(),
                kind: RuleKind::PositionFlip,
                cooldown: self.rule_cooldown,
                channels,
                enabled: true,
            },
        ]
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_decimal(key: &str, default: &str) -> anyhow::Result<Decimal> {
    let raw = env::var(key).unwrap_or_else(|_| default.into());
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{key} is not a valid decimal: {raw}"))
}
