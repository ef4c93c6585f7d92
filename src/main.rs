use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use hyperwatch::config::AppConfig;
use hyperwatch::ingestion::feed::{run_feed, ConnectionState, FeedConfig};
use hyperwatch::ingestion::pipeline::Pipeline;
use hyperwatch::services::channels::build_adapters;
use hyperwatch::services::dispatcher::Dispatcher;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Configuration errors are the only fatal ones, and only here.
    let config = AppConfig::from_env()?;
    let _metrics_handle = hyperwatch::metrics::init_metrics(&config.enabled_channels());

    tracing::info!(
        wallets = config.watched_wallets.len(),
        channels = ?config.enabled_channels(),
        "Starting hyperwatch pipeline"
    );

    // --- Dispatch layer: one worker per channel ---
    let specs = build_adapters(&config);
    let dispatcher = Arc::new(Dispatcher::new(
        specs,
        config.dispatch_queue_capacity,
        config.delivery_max_attempts,
    ));

    // --- Hot path: feed -> pipeline consumer ---
    let rules = config.default_rules();
    let mut pipeline = Pipeline::new(&config, rules);

    let (raw_tx, mut raw_rx) = mpsc::channel::<String>(1_000);
    let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed_config = FeedConfig {
        ws_url: config.feed_ws_url.clone(),
        wallets: config.watched_wallets.clone(),
        ping_interval: config.ping_interval,
        liveness_timeout: config.liveness_timeout,
        reconnect_base: config.reconnect_base,
        reconnect_max: config.reconnect_max,
    };
    let feed_task = tokio::spawn(run_feed(feed_config, state_tx, raw_tx, shutdown_rx));

    let consumer_dispatcher = dispatcher.clone();
    let consumer_task = tokio::spawn(async move {
        while let Some(raw) = raw_rx.recv().await {
            for alert in pipeline.process_raw(&raw, Instant::now()) {
                consumer_dispatcher.dispatch(alert);
            }
        }
        tracing::info!("Feed channel closed, pipeline consumer exiting");
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Stop the feed first; the consumer drains and exits once the raw
    // channel closes, then the dispatcher drains under the deadline.
    let _ = shutdown_tx.send(true);
    let _ = feed_task.await;
    let _ = consumer_task.await;

    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => dispatcher.stop(SHUTDOWN_DEADLINE).await,
        Err(_) => tracing::warn!("Dispatcher still referenced at shutdown"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
