use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ClassifiedEvent, Tier};

// ---------------------------------------------------------------------------
// AlertRule
// ---------------------------------------------------------------------------

/// Predicate parameters for an alert rule. Context-dependent kinds consult
/// the rule engine's per-wallet history buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RuleKind {
    /// Fires when the event tier is at or above `tier`.
    MinTier { tier: Tier },
    /// Fires for events from any of the listed wallets.
    WatchedWallet { wallets: Vec<String> },
    /// Fires when the wallet produced at least `min_events` events
    /// (including this one) within `window`.
    HighFrequency { min_events: usize, window: Duration },
    /// Fires when the wallet's summed notional (including this event)
    /// within `window` reaches `min_notional`.
    VolumeThreshold { min_notional: Decimal, window: Duration },
    /// Fires when the previous event for the same wallet and coin was on
    /// the opposite side.
    PositionFlip,
}

/// Configuration entity: loaded once at startup, immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub kind: RuleKind,
    /// Minimum spacing between fires for the same (wallet, coin) pair.
    pub cooldown: Duration,
    /// Channel names to notify when the rule fires.
    pub channels: Vec<String>,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// Output of the rule engine; consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub rule_id: String,
    pub event: ClassifiedEvent,
    pub message: String,
    pub channels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// DeliveryResult
// ---------------------------------------------------------------------------

/// Outcome of one delivery attempt by a channel adapter.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub success: bool,
    /// Whether the dispatcher should retry (e.g. HTTP 429/5xx, transport
    /// error) or give up immediately (e.g. bad webhook URL).
    pub retryable: bool,
    pub error_detail: Option<String>,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            retryable: false,
            error_detail: None,
        }
    }

    pub fn retryable(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: true,
            error_detail: Some(detail.into()),
        }
    }

    pub fn terminal(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: false,
            error_detail: Some(detail.into()),
        }
    }
}
