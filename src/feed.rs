//! Reference-Price Feed (§4.C).
//!
//! A persistent streaming client: fixed 5s reconnect on close (no
//! exponential backoff), a 30s heartbeat ping, and a bounded price
//! history. Grounded on `scrapers/polymarket_ws.rs`'s `connect_async` +
//! `tokio::select!` reconnect-loop shape, simplified from an order-book
//! cache keyed by asset id to a single ticker subscription.

use crate::models::{Change, Direction, Momentum, PriceContext, PriceSample};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const MAX_HISTORY: usize = 600;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const STALE_AFTER_SECS: i64 = 30;
const FRESH_AFTER_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TickerMessage {
    channel: Option<String>,
    last: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LatestPrice {
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
    pub last_update: i64,
    pub connected: bool,
    pub stale: bool,
}

struct FeedState {
    history: VecDeque<PriceSample>,
}

pub struct ReferencePriceFeed {
    state: RwLock<FeedState>,
    connected: AtomicBool,
    last_update: AtomicI64,
    ws_url: String,
    symbol: String,
}

impl ReferencePriceFeed {
    pub fn new(ws_url: impl Into<String>, symbol: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(FeedState { history: VecDeque::with_capacity(MAX_HISTORY) }),
            connected: AtomicBool::new(false),
            last_update: AtomicI64::new(0),
            ws_url: ws_url.into(),
            symbol: symbol.into(),
        })
    }

    pub fn spawn(self: &Arc<Self>) {
        let me = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = me.connect_and_stream().await {
                    tracing::warn!(error = %e, "reference price feed disconnected");
                }
                me.connected.store(false, Ordering::Relaxed);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }

    async fn connect_and_stream(self: &Arc<Self>) -> anyhow::Result<()> {
        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::json!({
            "method": "subscribe",
            "params": { "channel": "ticker", "symbol": [self.symbol.clone()] }
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        self.connected.store(true, Ordering::Relaxed);
        tracing::info!(symbol = %self.symbol, "reference price feed connected");

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        anyhow::bail!("heartbeat ping failed, scheduling reconnect");
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(payload))) => { let _ = write.send(Message::Pong(payload)).await; }
                        Some(Ok(Message::Close(_))) | None => anyhow::bail!("socket closed"),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => anyhow::bail!("socket read error: {e}"),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        // Parse errors on individual messages are swallowed (best-effort).
        let Ok(msg) = serde_json::from_str::<TickerMessage>(text) else { return };
        if msg.channel.as_deref().is_some_and(|c| c != "ticker") {
            return;
        }
        let (Some(last), Some(bid), Some(ask)) = (msg.last, msg.bid, msg.ask) else { return };

        let now = chrono::Utc::now().timestamp();
        let sample = PriceSample { price: last, bid, ask, t: now };

        let mut state = self.state.write();
        if let Some(back) = state.history.front() {
            if sample.t < back.t {
                return; // out-of-order, drop rather than violate monotonicity
            }
        }
        state.history.push_front(sample);
        while state.history.len() > MAX_HISTORY {
            state.history.pop_back();
        }
        self.last_update.store(now, Ordering::Relaxed);
    }

    pub fn get_latest_price(&self) -> LatestPrice {
        let state = self.state.read();
        let last_update = self.last_update.load(Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp();
        match state.history.front() {
            Some(s) => LatestPrice {
                price: s.price,
                bid: s.bid,
                ask: s.ask,
                last_update,
                connected: self.connected.load(Ordering::Relaxed),
                stale: now - last_update > STALE_AFTER_SECS,
            },
            None => LatestPrice { price: 0.0, bid: 0.0, ask: 0.0, last_update: 0, connected: false, stale: true },
        }
    }

    fn change_over(&self, history: &VecDeque<PriceSample>, current: f64, window_secs: i64, now: i64) -> Change {
        let cutoff = now - window_secs;
        // history is newest-first (push_front); walk it front-to-back to find
        // the newest sample at-or-before the cutoff.
        // "Price history exactly at cutoff boundary counted in the older partition."
        let oldest_in_window = history.iter().find(|s| s.t <= cutoff).or_else(|| history.back());
        match oldest_in_window {
            Some(old) if old.price != 0.0 => {
                let dollars = current - old.price;
                Change { dollars, percent: dollars / old.price * 100.0 }
            }
            _ => Change { dollars: 0.0, percent: 0.0 },
        }
    }

    pub fn get_price_context(&self) -> PriceContext {
        let state = self.state.read();
        let last_update = self.last_update.load(Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp();
        let available = now - last_update <= FRESH_AFTER_SECS && !state.history.is_empty();

        let Some(latest) = state.history.front() else {
            return PriceContext::default();
        };
        let current = latest.price;

        let change_60 = self.change_over(&state.history, current, 60, now);
        let change_180 = self.change_over(&state.history, current, 180, now);
        let change_300 = self.change_over(&state.history, current, 300, now);
        let change_600 = self.change_over(&state.history, current, 600, now);

        let direction = if change_60.percent > 0.05 {
            Direction::Rising
        } else if change_60.percent < -0.05 {
            Direction::Falling
        } else {
            Direction::Flat
        };

        let a60 = change_60.percent.abs();
        let a180 = change_180.percent.abs();
        let threshold_base = a180 / 3.0;
        let momentum = if threshold_base > 0.0 && a60 > 2.0 * threshold_base {
            Momentum::Accelerating
        } else if threshold_base > 0.0 && a60 < 0.3 * threshold_base {
            Momentum::Decelerating
        } else {
            Momentum::Stable
        };

        let cutoff_30 = now - 30;
        let recent: Vec<f64> = state.history.iter().filter(|s| s.t >= cutoff_30).map(|s| s.price).collect();
        let recent_volatility = match (recent.iter().cloned().fold(f64::MIN, f64::max), recent.iter().cloned().fold(f64::MAX, f64::min)) {
            (max, min) if max > f64::MIN && min < f64::MAX => max - min,
            _ => 0.0,
        };

        PriceContext {
            available,
            current,
            bid: latest.bid,
            ask: latest.ask,
            change_60,
            change_180,
            change_300,
            change_600,
            direction,
            momentum,
            recent_volatility,
        }
    }

    pub fn build_price_text(&self) -> String {
        let ctx = self.get_price_context();
        format!(
            "price={:.2} dir={:?} mom={:?} Δ1m={:.2}$({:.3}%) Δ3m={:.2}$({:.3}%) Δ5m={:.2}$({:.3}%) Δ10m={:.2}$({:.3}%) vol30s={:.2}",
            ctx.current,
            ctx.direction,
            ctx.momentum,
            ctx.change_60.dollars, ctx.change_60.percent,
            ctx.change_180.dollars, ctx.change_180.percent,
            ctx.change_300.dollars, ctx.change_300.percent,
            ctx.change_600.dollars, ctx.change_600.percent,
            ctx.recent_volatility,
        )
    }

    #[cfg(test)]
    fn push_sample_for_test(&self, sample: PriceSample) {
        let mut state = self.state.write();
        state.history.push_front(sample);
        self.last_update.store(sample.t, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_symmetric() {
        let feed = ReferencePriceFeed::new("wss://example", "BTC/USD");
        let now = chrono::Utc::now().timestamp();
        feed.push_sample_for_test(PriceSample { price: 100.0, bid: 99.9, ask: 100.1, t: now - 60 });
        feed.push_sample_for_test(PriceSample { price: 101.0, bid: 100.9, ask: 101.1, t: now });
        let ctx_up = feed.get_price_context();
        assert_eq!(ctx_up.direction, Direction::Rising);

        let feed2 = ReferencePriceFeed::new("wss://example", "BTC/USD");
        feed2.push_sample_for_test(PriceSample { price: 101.0, bid: 100.9, ask: 101.1, t: now - 60 });
        feed2.push_sample_for_test(PriceSample { price: 100.0, bid: 99.9, ask: 100.1, t: now });
        let ctx_down = feed2.get_price_context();
        assert_eq!(ctx_down.direction, Direction::Falling);
    }

    #[test]
    fn available_requires_recent_sample() {
        let feed = ReferencePriceFeed::new("wss://example", "BTC/USD");
        assert!(!feed.get_price_context().available);
        feed.push_sample_for_test(PriceSample { price: 100.0, bid: 99.9, ask: 100.1, t: chrono::Utc::now().timestamp() });
        assert!(feed.get_price_context().available);
    }

    #[test]
    fn stale_after_30s_without_update() {
        let feed = ReferencePriceFeed::new("wss://example", "BTC/USD");
        feed.push_sample_for_test(PriceSample { price: 100.0, bid: 99.9, ask: 100.1, t: chrono::Utc::now().timestamp() - 31 });
        assert!(feed.get_latest_price().stale);
    }
}
