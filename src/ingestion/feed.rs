use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Connection lifecycle, published over a `watch` channel so observers
/// (and tests) can follow the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Degraded,
    Reconnecting,
    ShuttingDown,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub ws_url: String,
    pub wallets: Vec<String>,
    pub ping_interval: Duration,
    pub liveness_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

#[derive(Debug, Serialize)]
struct WsSubscribe {
    method: &'static str,
    subscription: WsSubscription,
}

#[derive(Debug, Serialize)]
struct WsSubscription {
    #[serde(rename = "type")]
    channel: &'static str,
    user: String,
}

/// Subscription channels carried per wallet. Fills arrive on the first
/// two; order lifecycle frames on the third feed liveness tracking only.
const SUBSCRIPTION_CHANNELS: [&str; 3] = ["userFills", "userEvents", "orderUpdates"];

/// Build one subscribe frame per (wallet, channel). The full set is
/// re-sent on every reconnect; no server-side session resumption is
/// assumed.
fn build_subscribe_messages(wallets: &[String]) -> Vec<String> {
    wallets
        .iter()
        .flat_map(|wallet| {
            SUBSCRIPTION_CHANNELS.into_iter().filter_map(|channel| {
                let sub = WsSubscribe {
                    method: "subscribe",
                    subscription: WsSubscription {
                        channel,
                        user: wallet.clone(),
                    },
                };
                serde_json::to_string(&sub).ok()
            })
        })
        .collect()
}

/// Exponential backoff with cap. Jitter is applied separately so this
/// stays a pure, testable function.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = base.saturating_mul(2u32.saturating_pow(attempt));
    delay.min(max)
}

fn jittered(delay: Duration) -> Duration {
    // Uniform in [delay/2, delay] so concurrent instances don't thundering-herd.
    delay.mul_f64(0.5 + rand::random::<f64>() * 0.5)
}

/// Run the feed connection manager until shutdown.
///
/// Maintains one logical subscription: connect, subscribe every watched
/// wallet, then forward each inbound text frame to `raw_tx` in arrival
/// order. A connection with no inbound frame (data or ping) within the
/// liveness timeout is declared stale and torn down; reconnects retry
/// forever with capped, jittered exponential backoff. Transport failures
/// are logged and metered, never fatal.
pub async fn run_feed(
    config: FeedConfig,
    state_tx: watch::Sender<ConnectionState>,
    raw_tx: mpsc::Sender<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            let _ = state_tx.send(ConnectionState::ShuttingDown);
            return;
        }

        let _ = state_tx.send(ConnectionState::Connecting);
        tracing::info!(url = %config.ws_url, "Connecting to feed...");

        let connect = tokio::select! {
            result = connect_async(&config.ws_url) => result,
            _ = shutdown_rx.changed() => {
                let _ = state_tx.send(ConnectionState::ShuttingDown);
                return;
            }
        };

        match connect {
            Ok((ws_stream, _response)) => {
                tracing::info!("Feed connected");
                attempt = 0;

                let (mut write, mut read) = ws_stream.split();

                let mut subscribed = true;
                for msg in build_subscribe_messages(&config.wallets) {
                    if let Err(e) = write.send(Message::Text(msg.into())).await {
                        tracing::error!(error = %e, "Failed to send subscribe message");
                        subscribed = false;
                        break;
                    }
                }

                if subscribed {
                    let _ = state_tx.send(ConnectionState::Subscribed);
                    tracing::info!(
                        wallet_count = config.wallets.len(),
                        "Subscribed to watched wallets"
                    );

                    let mut ping_timer = interval(config.ping_interval);
                    ping_timer.tick().await; // consume the first immediate tick
                    let mut liveness_deadline = Instant::now() + config.liveness_timeout;

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        liveness_deadline = Instant::now() + config.liveness_timeout;
                                        counter!("feed_messages_total").increment(1);
                                        if raw_tx.send(text.to_string()).await.is_err() {
                                            tracing::warn!("Pipeline channel closed, stopping feed");
                                            let _ = state_tx.send(ConnectionState::ShuttingDown);
                                            return;
                                        }
                                    }
                                    Some(Ok(Message::Ping(data))) => {
                                        liveness_deadline = Instant::now() + config.liveness_timeout;
                                        if let Err(e) = write.send(Message::Pong(data)).await {
                                            tracing::warn!(error = %e, "Failed to send pong");
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Pong(_))) => {
                                        liveness_deadline = Instant::now() + config.liveness_timeout;
                                    }
                                    Some(Ok(Message::Close(_))) => {
                                        tracing::warn!("Feed sent close frame");
                                        break;
                                    }
                                    Some(Ok(_)) => {} // Binary, Frame — ignore
                                    Some(Err(e)) => {
                                        tracing::error!(error = %e, "Feed read error");
                                        break;
                                    }
                                    None => {
                                        tracing::warn!("Feed stream ended");
                                        break;
                                    }
                                }
                            }
                            _ = ping_timer.tick() => {
                                if let Err(e) = write.send(Message::Ping(vec![].into())).await {
                                    tracing::warn!(error = %e, "Failed to send ping");
                                    break;
                                }
                            }
                            _ = sleep_until(liveness_deadline) => {
                                // A stale-but-open socket silently loses data;
                                // tear it down and reconnect.
                                tracing::warn!(
                                    timeout_secs = config.liveness_timeout.as_secs(),
                                    "No inbound frame within liveness timeout, tearing down connection"
                                );
                                let _ = state_tx.send(ConnectionState::Degraded);
                                break;
                            }
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() || *shutdown_rx.borrow() {
                                    let _ = write.send(Message::Close(None)).await;
                                    let _ = state_tx.send(ConnectionState::ShuttingDown);
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Feed connection failed");
            }
        }

        let _ = state_tx.send(ConnectionState::Reconnecting);
        counter!("feed_reconnects_total").increment(1);

        let delay = jittered(backoff_delay(attempt, config.reconnect_base, config.reconnect_max));
        attempt = attempt.saturating_add(1);
        tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting...");

        tokio::select! {
            _ = sleep(delay) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = state_tx.send(ConnectionState::ShuttingDown);
                    return;
                }
            }
        }
    }
}
