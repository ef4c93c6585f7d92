use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::ParseError;
use crate::models::{Side, TradeEvent};

/// A feed frame: `{"channel": "...", "data": {...}}`. Fills arrive on the
/// `userFills` and `userEvents` channels; everything else (subscription
/// acks, pongs, order lifecycle, server errors) is not a trade payload
/// and normalizes to nothing.
#[derive(Debug, Deserialize)]
struct FeedFrame {
    channel: Option<String>,
    /// Some channels carry the wallet at the frame level instead of
    /// inside `data`.
    user: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UserFillsData {
    user: Option<String>,
    #[serde(rename = "isSnapshot", default)]
    is_snapshot: bool,
    #[serde(default)]
    fills: Vec<WsFill>,
}

#[derive(Debug, Deserialize)]
struct WsFill {
    coin: Option<String>,
    px: Option<String>,
    sz: Option<String>,
    side: Option<String>,
    time: Option<i64>,
    tid: Option<u64>,
}

/// Parses raw feed frames into canonical `TradeEvent`s.
///
/// Malformed payloads are rejected with a `ParseError` that the caller
/// logs and drops; normalization failures never halt the stream. Notional
/// is computed in decimal arithmetic so threshold boundaries stay exact.
pub struct Normalizer {
    next_seq: AtomicU64,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
        }
    }

    /// Normalize one frame. A `userFills` frame carries a batch of fills;
    /// individually bad fills are logged and skipped so one malformed fill
    /// does not sink its siblings.
    pub fn normalize(&self, raw: &str) -> Result<Vec<TradeEvent>, ParseError> {
        let frame: FeedFrame = serde_json::from_str(raw)?;

        match frame.channel.as_deref() {
            Some("userFills") | Some("userEvents") => {}
            Some("error") => {
                tracing::warn!(raw = %raw, "Feed reported server error");
                return Ok(Vec::new());
            }
            Some("orderUpdates") => {
                tracing::debug!("Order lifecycle frame, no fills");
                return Ok(Vec::new());
            }
            _ => return Ok(Vec::new()),
        }

        let data = frame.data.ok_or(ParseError::MissingField("data"))?;
        let fills: UserFillsData = serde_json::from_value(data)?;

        // Snapshot frames replay historical fills on subscribe; alerting
        // on them would re-announce old trades after every reconnect.
        if fills.is_snapshot {
            tracing::debug!(count = fills.fills.len(), "Skipping snapshot fills");
            return Ok(Vec::new());
        }

        let wallet = fills
            .user
            .or(frame.user)
            .ok_or(ParseError::MissingField("user"))?;

        let mut events = Vec::with_capacity(fills.fills.len());
        for fill in &fills.fills {
            match self.fill_to_event(&wallet, fill) {
                Ok(event) => events.push(event),
                Err(e) => {
                    counter!("parse_errors_total").increment(1);
                    tracing::warn!(error = %e, wallet = %wallet, "Dropping malformed fill");
                }
            }
        }
        Ok(events)
    }

    fn fill_to_event(&self, wallet: &str, fill: &WsFill) -> Result<TradeEvent, ParseError> {
        let coin = fill.coin.as_deref().ok_or(ParseError::MissingField("coin"))?;
        let side_raw = fill.side.as_deref().ok_or(ParseError::MissingField("side"))?;
        let side = Side::from_api_str(side_raw)
            .ok_or_else(|| ParseError::UnknownSide(side_raw.to_string()))?;

        let size = parse_decimal("sz", fill.sz.as_deref())?;
        if size < Decimal::ZERO {
            return Err(ParseError::NegativeSize(size.to_string()));
        }
        let price = parse_decimal("px", fill.px.as_deref())?;
        if price < Decimal::ZERO {
            return Err(ParseError::NegativePrice(price.to_string()));
        }
        let notional_usd = size * price;

        let timestamp = fill
            .time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let (source_seq, raw_id) = match fill.tid {
            Some(tid) => (tid, tid.to_string()),
            None => (
                self.next_seq.fetch_add(1, Ordering::Relaxed),
                TradeEvent::synthesize_raw_id(wallet, coin, side, timestamp, size),
            ),
        };

        Ok(TradeEvent {
            wallet: wallet.to_string(),
            coin: coin.to_string(),
            side,
            size,
            price,
            notional_usd,
            timestamp,
            source_seq,
            raw_id,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_decimal(field: &'static str, value: Option<&str>) -> Result<Decimal, ParseError> {
    let raw = value.ok_or(ParseError::MissingField(field))?;
    Decimal::from_str(raw).map_err(|_| ParseError::InvalidDecimal {
        field,
        value: raw.to_string(),
    })
}
