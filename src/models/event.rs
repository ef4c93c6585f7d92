use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Side, Tier};

// ---------------------------------------------------------------------------
// TradeEvent — core pipeline message
// ---------------------------------------------------------------------------

/// One observed fill for a watched wallet, as produced by the normalizer.
/// Immutable once created; every downstream stage gets its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub wallet: String,
    pub coin: String,
    pub side: Side,
    /// Base-asset size of the fill.
    pub size: Decimal,
    pub price: Decimal,
    /// `size * price`, always computed in decimal arithmetic.
    pub notional_usd: Decimal,
    /// Feed timestamp (UTC), not local receipt time.
    pub timestamp: DateTime<Utc>,
    /// Feed trade id when present, else a process-local monotonic counter.
    /// The feed is at-least-once and may reorder across reconnects.
    pub source_seq: u64,
    /// Identity key for deduplication.
    pub raw_id: String,
}

impl TradeEvent {
    /// Fallback dedup key for feeds that carry no explicit trade id.
    pub fn synthesize_raw_id(
        wallet: &str,
        coin: &str,
        side: Side,
        timestamp: DateTime<Utc>,
        size: Decimal,
    ) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            wallet,
            coin,
            side,
            timestamp.timestamp_millis(),
            size
        )
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade: wallet={} coin={} side={} size={} price={} notional={}",
            &self.wallet[..8.min(self.wallet.len())],
            self.coin,
            self.side,
            self.size,
            self.price,
            self.notional_usd,
        )
    }
}

// ---------------------------------------------------------------------------
// ClassifiedEvent
// ---------------------------------------------------------------------------

/// A `TradeEvent` with its severity tier attached. Never mutated after
/// creation by the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub event: TradeEvent,
    pub tier: Tier,
}

impl ClassifiedEvent {
    pub fn wallet(&self) -> &str {
        &self.event.wallet
    }

    pub fn coin(&self) -> &str {
        &self.event.coin
    }
}
