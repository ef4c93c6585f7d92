use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::models::Alert;
use crate::services::channels::{ChannelAdapter, ChannelSpec};
use crate::services::rate_limiter::TokenBucket;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded per-channel backlog. Oldest alerts are discarded first under
/// overload: stale alerts about past price moves lose their value.
struct Backlog {
    queue: Mutex<VecDeque<Alert>>,
    notify: Notify,
    capacity: usize,
    channel: String,
}

impl Backlog {
    fn push(&self, alert: Alert) {
        let depth = {
            let mut queue = self.queue.lock().expect("backlog lock poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                counter!("alerts_dropped_total", "channel" => self.channel.clone()).increment(1);
                tracing::warn!(
                    channel = %self.channel,
                    capacity = self.capacity,
                    "Backlog full, dropping oldest queued alert"
                );
            }
            queue.push_back(alert);
            queue.len()
        };
        gauge!("dispatch_queue_depth", "channel" => self.channel.clone()).set(depth as f64);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Alert> {
        let (alert, depth) = {
            let mut queue = self.queue.lock().expect("backlog lock poisoned");
            let alert = queue.pop_front();
            (alert, queue.len())
        };
        if alert.is_some() {
            gauge!("dispatch_queue_depth", "channel" => self.channel.clone()).set(depth as f64);
        }
        alert
    }

    fn len(&self) -> usize {
        self.queue.lock().expect("backlog lock poisoned").len()
    }
}

/// Routes alerts to per-channel delivery workers. Each channel owns its
/// backlog, token bucket, and retry loop; a dead channel never holds a
/// lock a healthy one needs.
pub struct Dispatcher {
    backlogs: HashMap<String, Arc<Backlog>>,
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Dispatcher {
    /// Spawn one worker per configured channel.
    pub fn new(specs: Vec<ChannelSpec>, queue_capacity: usize, max_attempts: u32) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let mut backlogs = HashMap::new();
        let mut workers = Vec::new();

        for spec in specs {
            let name = spec.adapter.name().to_string();
            let backlog = Arc::new(Backlog {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                capacity: queue_capacity,
                channel: name.clone(),
            });
            backlogs.insert(name.clone(), backlog.clone());

            let bucket = TokenBucket::new(spec.rate_capacity, spec.refill_per_sec, Instant::now());
            let shutdown_rx = shutdown_tx.subscribe();
            workers.push(tokio::spawn(run_worker(
                name,
                backlog,
                spec.adapter,
                bucket,
                max_attempts,
                shutdown_rx,
            )));
        }

        Self {
            backlogs,
            workers,
            shutdown_tx,
        }
    }

    /// Fire-and-forget: enqueue the alert on every target channel's
    /// backlog. Unknown channel names are logged and skipped.
    pub fn dispatch(&self, alert: Alert) {
        if *self.shutdown_tx.borrow() {
            tracing::debug!(rule = %alert.rule_id, "Dispatcher shutting down, alert not accepted");
            return;
        }

        for channel in &alert.channels {
            match self.backlogs.get(channel) {
                Some(backlog) => backlog.push(alert.clone()),
                None => {
                    tracing::warn!(channel = %channel, rule = %alert.rule_id, "Alert targets unknown channel");
                }
            }
        }
    }

    /// Current backlog depth for a channel, if it exists.
    pub fn backlog_depth(&self, channel: &str) -> Option<usize> {
        self.backlogs.get(channel).map(|b| b.len())
    }

    /// Stop intake, let workers drain their current item, and bound total
    /// shutdown time. Backlog remaining after the deadline is discarded.
    pub async fn stop(self, deadline: Duration) {
        let _ = self.shutdown_tx.send(true);
        for backlog in self.backlogs.values() {
            backlog.notify.notify_one();
        }

        let abort_handles: Vec<_> = self.workers.iter().map(|w| w.abort_handle()).collect();
        let join_all = async {
            for worker in self.workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(deadline, join_all).await.is_err() {
            tracing::warn!(
                deadline_secs = deadline.as_secs(),
                "Dispatcher shutdown deadline hit, aborting remaining workers"
            );
            for handle in abort_handles {
                handle.abort();
            }
        }

        for (channel, backlog) in &self.backlogs {
            let remaining = backlog.len();
            if remaining > 0 {
                counter!("alerts_dropped_total", "channel" => channel.clone())
                    .increment(remaining as u64);
                tracing::warn!(
                    channel = %channel,
                    remaining,
                    "Discarding undelivered backlog at shutdown"
                );
            }
        }
    }
}

async fn run_worker(
    channel: String,
    backlog: Arc<Backlog>,
    adapter: Arc<dyn ChannelAdapter>,
    mut bucket: TokenBucket,
    max_attempts: u32,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!(channel = %channel, "Delivery worker started");

    loop {
        // Wait for the next alert.
        let alert = loop {
            if let Some(alert) = backlog.pop() {
                break alert;
            }
            if *shutdown_rx.borrow() {
                tracing::debug!(channel = %channel, "Delivery worker stopped");
                return;
            }
            tokio::select! {
                _ = backlog.notify.notified() => {}
                changed = shutdown_rx.changed() => {
                    // A dropped sender means no more intake; stop too.
                    if changed.is_err() {
                        tracing::debug!(channel = %channel, "Shutdown channel closed, delivery worker stopped");
                        return;
                    }
                }
            }
        };

        // Gate on the channel's token bucket; queued alerts wait rather
        // than being dropped.
        let mut limited_logged = false;
        while !bucket.try_acquire(Instant::now()) {
            if !limited_logged {
                counter!("deliveries_rate_limited_total", "channel" => channel.clone()).increment(1);
                tracing::debug!(channel = %channel, "Rate limited, holding delivery");
                limited_logged = true;
            }
            let wait = bucket.next_token_secs().max(0.05);
            tokio::select! {
                _ = sleep(Duration::from_secs_f64(wait)) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::warn!(channel = %channel, rule = %alert.rule_id, "Shutdown while rate limited, dropping alert");
                        return;
                    }
                }
            }
        }

        deliver_with_retry(&channel, adapter.as_ref(), &alert, max_attempts).await;

        if *shutdown_rx.borrow() {
            tracing::debug!(channel = %channel, "Delivery worker stopped after draining current item");
            return;
        }
    }
}

/// Attempt delivery, retrying retryable failures with bounded exponential
/// backoff up to `max_attempts`, then give up with a logged terminal drop.
async fn deliver_with_retry(
    channel: &str,
    adapter: &dyn ChannelAdapter,
    alert: &Alert,
    max_attempts: u32,
) {
    for attempt in 1..=max_attempts {
        let result = adapter.deliver(alert).await;

        if result.success {
            counter!("alerts_dispatched_total", "channel" => channel.to_string()).increment(1);
            tracing::info!(
                channel = %channel,
                rule = %alert.rule_id,
                attempt,
                "Alert delivered"
            );
            return;
        }

        let detail = result.error_detail.as_deref().unwrap_or("unknown");
        if !result.retryable || attempt == max_attempts {
            counter!("alerts_failed_total", "channel" => channel.to_string()).increment(1);
            tracing::error!(
                channel = %channel,
                rule = %alert.rule_id,
                attempt,
                error = %detail,
                "Delivery failed terminally, dropping alert"
            );
            return;
        }

        let delay = (RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1)).min(RETRY_MAX_DELAY);
        tracing::warn!(
            channel = %channel,
            rule = %alert.rule_id,
            attempt,
            delay_secs = delay.as_secs(),
            error = %detail,
            "Delivery failed, retrying"
        );
        sleep(delay).await;
    }
}
