use rust_decimal::Decimal;

use crate::config::Thresholds;
use crate::models::{ClassifiedEvent, Tier, TradeEvent};

/// Assign a severity tier from the event's USD notional.
///
/// Thresholds are inclusive lower bounds: an event exactly at a threshold
/// takes the higher tier. Below the NOTABLE threshold the event classifies
/// as NONE and is dropped before the rule engine.
pub fn classify(event: TradeEvent, thresholds: &Thresholds) -> ClassifiedEvent {
    let tier = tier_for(event.notional_usd, thresholds);
    ClassifiedEvent { event, tier }
}

pub fn tier_for(notional_usd: Decimal, thresholds: &Thresholds) -> Tier {
    if notional_usd >= thresholds.whale {
        Tier::Whale
    } else if notional_usd >= thresholds.large {
        Tier::Large
    } else if notional_usd >= thresholds.medium {
        Tier::Medium
    } else if notional_usd >= thresholds.notable {
        Tier::Notable
    } else {
        Tier::None
    }
}
