use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use hyperwatch::models::{Alert, ClassifiedEvent, DeliveryResult, Side, Tier, TradeEvent};
use hyperwatch::services::channels::{ChannelAdapter, ChannelSpec};
use hyperwatch::services::dispatcher::Dispatcher;

#[derive(Clone, Copy)]
enum Mode {
    Succeed,
    FailRetryable,
    FailTerminal,
}

struct MockAdapter {
    channel: &'static str,
    mode: Mode,
    attempts: Arc<AtomicUsize>,
    delivered: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    fn spec(
        channel: &'static str,
        mode: Mode,
        rate_capacity: f64,
        refill_per_sec: f64,
    ) -> (ChannelSpec, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let spec = ChannelSpec {
            adapter: Arc::new(MockAdapter {
                channel,
                mode,
                attempts: attempts.clone(),
                delivered: delivered.clone(),
            }),
            rate_capacity,
            refill_per_sec,
        };
        (spec, attempts, delivered)
    }
}

#[async_trait]
impl ChannelAdapter for MockAdapter {
    fn name(&self) -> &str {
        self.channel
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Succeed => {
                self.delivered.lock().unwrap().push(alert.message.clone());
                DeliveryResult::ok()
            }
            Mode::FailRetryable => DeliveryResult::retryable("mock outage"),
            Mode::FailTerminal => DeliveryResult::terminal("mock rejection"),
        }
    }
}

fn make_alert(channel: &str, message: &str) -> Alert {
    let event = TradeEvent {
        wallet: "0xabcdef0123456789".into(),
        coin: "BTC".into(),
        side: Side::Buy,
        size: Decimal::ONE,
        price: Decimal::from(50_000),
        notional_usd: Decimal::from(50_000),
        timestamp: Utc::now(),
        source_seq: 1,
        raw_id: format!("test|{message}"),
    };
    Alert {
        rule_id: "test_rule".into(),
        event: ClassifiedEvent {
            event,
            tier: Tier::Medium,
        },
        message: message.into(),
        channels: vec![channel.into()],
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_burst_is_delivered_then_rate_limit_queues_the_rest() {
    // Capacity 5, refill 1/s: of 10 instant alerts, 5 go out immediately
    // and the rest wait for tokens without being dropped.
    let (spec, _, delivered) = MockAdapter::spec("mock", Mode::Succeed, 5.0, 1.0);
    let dispatcher = Dispatcher::new(vec![spec], 100, 3);

    for i in 0..10 {
        dispatcher.dispatch(make_alert("mock", &format!("a{i}")));
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(delivered.lock().unwrap().len(), 5);

    // One token refills at the 1s mark.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let count = delivered.lock().unwrap().len();
    assert!(count >= 6, "expected a sixth delivery after refill, got {count}");
    assert!(count <= 7, "deliveries outran the refill rate: {count}");

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_failing_channel_does_not_block_healthy_one() {
    let (flaky, flaky_attempts, _) = MockAdapter::spec("flaky", Mode::FailRetryable, 100.0, 50.0);
    let (steady, _, steady_delivered) = MockAdapter::spec("steady", Mode::Succeed, 100.0, 50.0);
    let dispatcher = Dispatcher::new(vec![flaky, steady], 100, 3);

    for i in 0..3 {
        let mut alert = make_alert("steady", &format!("a{i}"));
        alert.channels = vec!["flaky".into(), "steady".into()];
        dispatcher.dispatch(alert);
    }

    // The flaky worker is stuck in retry backoff; the steady worker is not.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(steady_delivered.lock().unwrap().len(), 3);
    assert!(flaky_attempts.load(Ordering::SeqCst) >= 1);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_backlog_drops_oldest_under_overload() {
    // One token, near-zero refill: the worker can deliver a single alert
    // and the tiny backlog must shed from the front.
    let (spec, _, delivered) = MockAdapter::spec("slow", Mode::Succeed, 1.0, 0.001);
    let dispatcher = Dispatcher::new(vec![spec], 2, 3);

    // Single-threaded runtime: all five pushes land before the worker runs,
    // so the queue keeps only the newest two (a3, a4).
    for i in 0..5 {
        dispatcher.dispatch(make_alert("slow", &format!("a{i}")));
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*delivered.lock().unwrap(), vec!["a3".to_string()]);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_terminal_failure_is_not_retried() {
    let (spec, attempts, _) = MockAdapter::spec("mock", Mode::FailTerminal, 100.0, 50.0);
    let dispatcher = Dispatcher::new(vec![spec], 100, 3);

    dispatcher.dispatch(make_alert("mock", "doomed"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_retryable_failure_exhausts_attempts() {
    let (spec, attempts, _) = MockAdapter::spec("mock", Mode::FailRetryable, 100.0, 50.0);
    let dispatcher = Dispatcher::new(vec![spec], 100, 2);

    dispatcher.dispatch(make_alert("mock", "doomed"));

    // Attempt 1 fails immediately, attempt 2 after the 1s retry delay.
    tokio::time::sleep(Duration::from_millis(1_400)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unknown_channel_is_skipped() {
    let (spec, _, delivered) = MockAdapter::spec("mock", Mode::Succeed, 100.0, 50.0);
    let dispatcher = Dispatcher::new(vec![spec], 100, 3);

    let mut alert = make_alert("mock", "routed");
    alert.channels = vec!["nonexistent".into(), "mock".into()];
    dispatcher.dispatch(alert);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*delivered.lock().unwrap(), vec!["routed".to_string()]);
    assert_eq!(dispatcher.backlog_depth("nonexistent"), None);

    dispatcher.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_workers_exit_when_dispatcher_is_dropped_without_stop() {
    let adapter: Arc<dyn ChannelAdapter> = Arc::new(MockAdapter {
        channel: "mock",
        mode: Mode::Succeed,
        attempts: Arc::new(AtomicUsize::new(0)),
        delivered: Arc::new(Mutex::new(Vec::new())),
    });
    let dispatcher = Dispatcher::new(
        vec![ChannelSpec {
            adapter: adapter.clone(),
            rate_capacity: 100.0,
            refill_per_sec: 50.0,
        }],
        100,
        3,
    );

    // Let the worker park on its empty backlog, then drop the dispatcher.
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(dispatcher);

    // The closed shutdown channel must stop the worker; its adapter handle
    // is released when it exits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(Arc::strong_count(&adapter), 1);
}

#[tokio::test]
async fn test_stop_completes_within_deadline() {
    let (spec, _, delivered) = MockAdapter::spec("mock", Mode::Succeed, 100.0, 50.0);
    let dispatcher = Dispatcher::new(vec![spec], 100, 3);

    dispatcher.dispatch(make_alert("mock", "last"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    dispatcher.stop(Duration::from_secs(5)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(delivered.lock().unwrap().len(), 1);
}
