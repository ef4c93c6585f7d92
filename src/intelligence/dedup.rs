use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::TradeEvent;

/// Entries are swept lazily once the map grows past this size.
const SWEEP_WATERMARK: usize = 4_096;

/// Sliding identity window over `raw_id`. The feed delivers at-least-once
/// and may retransmit across reconnects; this stage is the single source
/// of truth for "have we already seen equivalent information".
///
/// Owned exclusively by the pipeline task; no locking needed.
#[derive(Debug)]
pub struct Deduplicator {
    horizon: Duration,
    seen: HashMap<String, Instant>,
}

impl Deduplicator {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            seen: HashMap::new(),
        }
    }

    /// Returns true if the event is novel (proceed) or false if it is a
    /// duplicate within the horizon (drop). Novel events refresh the window.
    pub fn accept(&mut self, event: &TradeEvent, now: Instant) -> bool {
        if let Some(last_seen) = self.seen.get(&event.raw_id) {
            if now.duration_since(*last_seen) < self.horizon {
                return false;
            }
        }

        self.seen.insert(event.raw_id.clone(), now);

        // Memory stays bounded by distinct ids per horizon, not total
        // events seen.
        if self.seen.len() > SWEEP_WATERMARK {
            self.evict_expired(now);
        }

        true
    }

    fn evict_expired(&mut self, now: Instant) {
        let horizon = self.horizon;
        self.seen
            .retain(|_, last_seen| now.duration_since(*last_seen) < horizon);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
