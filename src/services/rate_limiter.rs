use std::time::Instant;

/// Token bucket gating outbound traffic for one notification channel.
///
/// Tokens refill continuously at `refill_per_sec` up to `capacity`;
/// `try_acquire` refills lazily from the elapsed time and consumes one
/// token when available. Each bucket is owned by exactly one dispatcher
/// worker, so no synchronization is needed.
///
/// A bucket tolerates short bursts (correlated whale trades across several
/// wallets) while bounding the long-run average rate, which suits the
/// naturally bursty alert traffic better than a sliding window.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    /// Consume one token if available. Returns false when exhausted; the
    /// caller queues the alert rather than dropping it.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until the next token becomes available, for worker sleeps.
    pub fn next_token_secs(&self) -> f64 {
        if self.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - self.tokens) / self.refill_per_sec
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}
