use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::{Alert, DeliveryResult, Tier};

/// Uniform delivery contract. The dispatcher treats every adapter the
/// same; formatting for a given medium lives inside that adapter.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, alert: &Alert) -> DeliveryResult;
}

/// An adapter plus its rate-limit parameters, as resolved from config.
pub struct ChannelSpec {
    pub adapter: Arc<dyn ChannelAdapter>,
    pub rate_capacity: f64,
    pub refill_per_sec: f64,
}

/// Build the adapter registry from configuration. Channels with missing
/// credentials were already rejected at startup validation; this only sees
/// fully-configured ones.
pub fn build_adapters(config: &AppConfig) -> Vec<ChannelSpec> {
    let http = reqwest::Client::new();
    let mut specs = Vec::new();

    if let Some(d) = &config.discord {
        specs.push(ChannelSpec {
            adapter: Arc::new(DiscordAdapter {
                http: http.clone(),
                webhook_url: d.webhook_url.clone(),
                username: d.username.clone(),
            }),
            rate_capacity: d.rate_capacity,
            refill_per_sec: d.refill_per_sec,
        });
    }

    if let Some(t) = &config.telegram {
        specs.push(ChannelSpec {
            adapter: Arc::new(TelegramAdapter {
                http: http.clone(),
                bot_token: t.bot_token.clone(),
                chat_id: t.chat_id.clone(),
            }),
            rate_capacity: t.rate_capacity,
            refill_per_sec: t.refill_per_sec,
        });
    }

    if let Some(w) = &config.webhook {
        specs.push(ChannelSpec {
            adapter: Arc::new(WebhookAdapter {
                http,
                url: w.url.clone(),
                auth_header: w.auth_header.clone(),
            }),
            rate_capacity: w.rate_capacity,
            refill_per_sec: w.refill_per_sec,
        });
    }

    specs
}

fn result_from_status(channel: &str, status: reqwest::StatusCode) -> DeliveryResult {
    if status.is_success() {
        DeliveryResult::ok()
    } else if status.as_u16() == 429 || status.is_server_error() {
        DeliveryResult::retryable(format!("{channel} returned {status}"))
    } else {
        DeliveryResult::terminal(format!("{channel} rejected payload: {status}"))
    }
}

// ---------------------------------------------------------------------------
// Discord
// ---------------------------------------------------------------------------

pub struct DiscordAdapter {
    http: reqwest::Client,
    webhook_url: String,
    username: String,
}

fn tier_color(tier: Tier) -> u32 {
    match tier {
        Tier::Whale => 0xe74c3c,
        Tier::Large => 0xe67e22,
        Tier::Medium => 0xf1c40f,
        _ => 0x95a5a6,
    }
}

#[async_trait]
impl ChannelAdapter for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryResult {
        let body = json!({
            "username": self.username,
            "embeds": [{
                "title": format!("{} — {}", alert.event.tier, alert.rule_id),
                "description": alert.message,
                "color": tier_color(alert.event.tier),
                "timestamp": alert.created_at.to_rfc3339(),
            }],
        });

        match self.http.post(&self.webhook_url).json(&body).send().await {
            Ok(resp) => result_from_status("discord", resp.status()),
            Err(e) => DeliveryResult::retryable(format!("discord request failed: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

pub struct TelegramAdapter {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryResult {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": format!("*{}*\n{}", alert.rule_id, alert.message),
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => result_from_status("telegram", resp.status()),
            Err(e) => DeliveryResult::retryable(format!("telegram request failed: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic webhook
// ---------------------------------------------------------------------------

pub struct WebhookAdapter {
    http: reqwest::Client,
    url: String,
    auth_header: Option<String>,
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryResult {
        let mut request = self.http.post(&self.url).json(alert);
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        match request.send().await {
            Ok(resp) => result_from_status("webhook", resp.status()),
            Err(e) => DeliveryResult::retryable(format!("webhook request failed: {e}")),
        }
    }
}
