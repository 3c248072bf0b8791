//! Bot Loop Coordinator (§4.K).
//!
//! Ties §4.A–§4.J together on a periodic cadence. Grounded on
//! `vault/fast15m_reactive.rs`'s `ReactiveFast15mEngine` shape (engine
//! holding shared state + an execution adapter, gating checks run in order
//! with skip-reason tracking) blended with
//! `other_examples/…0xBoji-polymarket-sniper-rs…sniper.rs`'s top-level
//! interval-timer coordinator shape, simplified to the spec's single
//! serial `SCAN_INTERVAL` tick (no event-driven fan-out).

use crate::activity::ActivityBus;
use crate::clob::ClobClient;
use crate::discovery::MarketDiscovery;
use crate::executor::{OrderExecutor, RetryPolicy};
use crate::feed::ReferencePriceFeed;
use crate::fetcher::MarketDataFetcher;
use crate::models::{Action, Decision, MarketSnapshot, PendingRedemption, RedemptionStatus};
use crate::policy::{DecisionPolicy, SpikeDetectorPolicy};
use crate::redemption::queue::PendingRedemptionQueue;
use crate::redemption::RedemptionEngine;
use crate::safety::SafetyLedger;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyMode {
    /// Strategy 1: the spike detector's own signal is authoritative.
    Spike,
    /// Strategy 2: the spike detector only gates whether to bother
    /// fetching a snapshot; the configured policy decides.
    Model,
}

pub struct BotLoopCoordinator {
    bus: Arc<ActivityBus>,
    safety: Arc<SafetyLedger>,
    feed: Arc<ReferencePriceFeed>,
    discovery: MarketDiscovery,
    clob: ClobClient,
    executor_address: String,
    retry_policy: RetryPolicy,
    spike_policy: SpikeDetectorPolicy,
    model_policy: Option<Arc<dyn DecisionPolicy>>,
    mode: StrategyMode,
    redemption: Arc<RedemptionEngine>,
    queue: Arc<PendingRedemptionQueue>,
    asset: String,
    max_entry_price: f64,
    is_running: AtomicBool,
    tick_in_progress: AtomicBool,
    last_scan_time: AtomicI64,
}

#[allow(clippy::too_many_arguments)]
impl BotLoopCoordinator {
    pub fn new(
        bus: Arc<ActivityBus>,
        safety: Arc<SafetyLedger>,
        feed: Arc<ReferencePriceFeed>,
        discovery: MarketDiscovery,
        clob: ClobClient,
        executor_address: String,
        retry_policy: RetryPolicy,
        model_policy: Option<Arc<dyn DecisionPolicy>>,
        mode: StrategyMode,
        redemption: Arc<RedemptionEngine>,
        queue: Arc<PendingRedemptionQueue>,
        asset: String,
        max_entry_price: f64,
        spike_policy: SpikeDetectorPolicy,
    ) -> Self {
        Self {
            bus,
            safety,
            feed,
            discovery,
            clob,
            executor_address,
            retry_policy,
            spike_policy,
            model_policy,
            mode,
            redemption,
            queue,
            asset,
            max_entry_price,
            is_running: AtomicBool::new(false),
            tick_in_progress: AtomicBool::new(false),
            last_scan_time: AtomicI64::new(0),
        }
    }

    pub fn start(&self) {
        self.is_running.store(true, Ordering::Release);
        self.bus.append_activity("bot_start", "coordinator started");
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
        self.bus.append_activity("bot_stop", "coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn last_scan_time(&self) -> i64 {
        self.last_scan_time.load(Ordering::Acquire)
    }

    /// One coordinator tick. An explicit latch prevents overlapping ticks
    /// if the previous tick is still running when the timer fires (§4.K
    /// "Concurrency contract").
    pub async fn tick(&self) {
        if self.tick_in_progress.swap(true, Ordering::AcqRel) {
            return;
        }
        self.run_tick().await;
        self.tick_in_progress.store(false, Ordering::Release);
    }

    async fn run_tick(&self) {
        // "1. If not running, return." — observed at the top of the tick,
        // including the redemption sweep (§5 "graceful stop").
        if !self.is_running() {
            return;
        }
        self.last_scan_time.store(chrono::Utc::now().timestamp(), Ordering::Release);

        let can_trade = self.safety.can_trade();
        if !can_trade.allowed {
            self.bus.append_activity("safety_block", can_trade.reason);
        } else {
            self.try_trade().await;
        }

        // "8. Always: redemptionEngine.checkAndRedeem()."
        self.redemption.check_and_redeem().await;
    }

    async fn try_trade(&self) {
        let now = chrono::Utc::now().timestamp();
        let ctx = self.feed.get_price_context();

        // "3. decision = policyPreamble()" — the deterministic spike check
        // always runs first as a cheap feed-only gate; in spike mode its
        // result is authoritative, in model mode it only narrows discovery.
        let spike_mode = self.mode == StrategyMode::Spike;
        let Some(market) = self.discovery.scan_markets(&self.asset, now, spike_mode).await.into_iter().next() else {
            return;
        };

        let window = self.safety.get_window_key(market.end_time);
        if self.safety.has_traded(&self.asset, &window) {
            return; // dedup: at most one trade per (asset, window)
        }

        let fetcher = MarketDataFetcher::new(&self.clob);
        let snapshot = fetcher.fetch_full_market_data(&market).await;
        if snapshot.yes_token.price.mid.is_none() && snapshot.no_token.price.mid.is_none() {
            return;
        }

        let raw_decision = match self.mode {
            StrategyMode::Spike => self.spike_policy.decide(&snapshot, &ctx).await,
            StrategyMode::Model => match &self.model_policy {
                Some(policy) => policy.decide(&snapshot, &ctx).await,
                None => Decision::skip("no model policy configured"),
            },
        };

        let decision = self.apply_entry_gate(raw_decision, &snapshot);
        self.bus.append_decision(decision.clone());
        if decision.action == Action::Skip {
            return;
        }

        let recheck = self.safety.can_trade();
        if !recheck.allowed {
            self.bus.append_activity("safety_block", recheck.reason);
            return;
        }

        let size = self.safety.get_trade_size(decision.confidence);
        if size <= 0.0 {
            return;
        }

        let executor = OrderExecutor::new(&self.clob, &self.executor_address, self.retry_policy);
        let trade = executor.execute(&decision, &snapshot, size).await;
        let trade = self.bus.append_trade(trade);

        if trade.order_id.is_some() {
            self.safety.record_trade(size);
            self.safety.mark_traded(&self.asset, &window);
            self.queue.append(PendingRedemption {
                condition_id: trade.condition_id.clone(),
                token_id: Some(trade.token_id.clone()),
                neg_risk: trade.neg_risk,
                market_end_time: trade.market_end_time,
                added_at: now,
                status: RedemptionStatus::Waiting,
                tx_hash: None,
                redeemed_at: None,
                error: None,
            });
        }
    }

    /// "Entry price must be ≤ MAX_ENTRY_PRICE in the chosen side's mid;
    /// otherwise convert to SKIP with reason 'priced in'" (§4.F, §4.K step 7).
    fn apply_entry_gate(&self, decision: Decision, snapshot: &MarketSnapshot) -> Decision {
        if decision.action == Action::Skip {
            return decision;
        }
        let mid = match decision.action {
            Action::BuyYes => snapshot.yes_token.price.mid,
            Action::BuyNo => snapshot.no_token.price.mid,
            Action::Skip => None,
        };
        match mid {
            Some(m) if m <= self.max_entry_price => decision,
            _ => Decision::skip("priced in"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TokenPrice, TokenSnapshot};

    fn snapshot_with_mid(yes_mid: Option<f64>) -> MarketSnapshot {
        use crate::models::{MarketRecord, MarketToken, Outcome, OrderBookSnapshot};
        MarketSnapshot {
            market: MarketRecord {
                condition_id: "0x1".into(),
                question: "q".into(),
                end_time: 0,
                tokens: [
                    MarketToken { token_id: "yes".into(), outcome: Outcome::Up },
                    MarketToken { token_id: "no".into(), outcome: Outcome::Down },
                ],
                neg_risk: false,
                tick_size: 0.01,
                asset: "btc".into(),
            },
            yes_token: TokenSnapshot { price: TokenPrice { buy: yes_mid, sell: yes_mid, mid: yes_mid }, book: OrderBookSnapshot::default() },
            no_token: TokenSnapshot::default(),
            price_history: Vec::new(),
        }
    }

    fn coordinator_for_gate_test() -> BotLoopCoordinator {
        let bus = Arc::new(ActivityBus::new());
        let safety = Arc::new(SafetyLedger::new(bus.clone(), 200.0, 6, 50.0));
        let feed = ReferencePriceFeed::new("wss://example", "BTC/USD");
        let discovery = MarketDiscovery::new(reqwest::Client::new(), "https://example.invalid".into());
        let clob = ClobClient::new("https://example.invalid", None);
        let queue = Arc::new(PendingRedemptionQueue::new());
        let wallet = crate::redemption::wallet_from_private_key(
            "1111111111111111111111111111111111111111111111111111111111111111",
        )
        .unwrap();
        let redemption = Arc::new(RedemptionEngine::new(bus.clone(), queue.clone(), "https://example.invalid".into(), Vec::new(), wallet, 137, None));
        BotLoopCoordinator::new(
            bus,
            safety,
            feed,
            discovery,
            clob,
            "0xabc".into(),
            RetryPolicy::model_scored(),
            None,
            StrategyMode::Spike,
            redemption,
            queue,
            "btc".into(),
            0.45,
            SpikeDetectorPolicy::default(),
        )
    }

    #[test]
    fn entry_gate_accepts_at_boundary_and_rejects_above() {
        let coordinator = coordinator_for_gate_test();
        let decision = Decision::new(Action::BuyYes, crate::models::Confidence::High, "spike", "r");
        let snapshot_at_boundary = snapshot_with_mid(Some(0.45));
        assert_eq!(coordinator.apply_entry_gate(decision.clone(), &snapshot_at_boundary).action, Action::BuyYes);

        let snapshot_above = snapshot_with_mid(Some(0.46));
        assert_eq!(coordinator.apply_entry_gate(decision, &snapshot_above).action, Action::Skip);
    }

    #[test]
    fn entry_gate_passes_through_skip() {
        let coordinator = coordinator_for_gate_test();
        let decision = Decision::skip("no spike");
        let snapshot = snapshot_with_mid(Some(0.2));
        assert_eq!(coordinator.apply_entry_gate(decision, &snapshot).action, Action::Skip);
    }
}
