pub mod alert;
pub mod event;

pub use alert::{Alert, AlertRule, DeliveryResult, RuleKind};
pub use event::{ClassifiedEvent, TradeEvent};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse the side codes seen on the feed. Hyperliquid fills use
    /// `"B"` (bid) and `"A"` (ask); other payloads spell it out.
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "B" | "BUY" | "LONG" => Some(Side::Buy),
            "A" | "SELL" | "SHORT" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Severity tier of an event's USD notional. Variant order is the tier
/// ordering, so `Ord` gives `None < Notable < Medium < Large < Whale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    None,
    Notable,
    Medium,
    Large,
    Whale,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "NONE",
            Tier::Notable => "NOTABLE",
            Tier::Medium => "MEDIUM",
            Tier::Large => "LARGE",
            Tier::Whale => "WHALE",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
