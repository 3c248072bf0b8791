//! Safety Ledger (§4.B).
//!
//! Process-wide single-writer state, grounded on the teacher's
//! `RiskManager` shape in `risk.rs` (a struct of counters behind one lock,
//! with a `guardrail_state()`-style read method) but implementing the
//! spec's deterministic daily-counter / kill-switch contract rather than
//! Kelly/VaR bankroll risk.

use crate::activity::ActivityBus;
use crate::models::{window_key, Confidence, SafetyLedgerState};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct CanTrade {
    pub allowed: bool,
    pub reason: String,
}

pub struct SafetyLedger {
    state: Mutex<SafetyLedgerState>,
    bus: Arc<ActivityBus>,
    daily_loss_limit: f64,
    max_daily_losses: u32,
    max_trade_size: f64,
    /// Whether `getTradeSize` clamps forward loss budget. Resolved Open
    /// Question — see DESIGN.md: applies universally, not only to one
    /// strategy, since the ledger has no notion of which strategy called it.
    clamp_forward_loss_budget: bool,
}

impl SafetyLedger {
    pub fn new(bus: Arc<ActivityBus>, daily_loss_limit: f64, max_daily_losses: u32, max_trade_size: f64) -> Self {
        Self {
            state: Mutex::new(SafetyLedgerState {
                last_reset_date: crate::models::local_date_string(Utc::now()),
                ..Default::default()
            }),
            bus,
            daily_loss_limit,
            max_daily_losses,
            max_trade_size,
            clamp_forward_loss_budget: true,
        }
    }

    fn reset_daily_if_needed(&self, state: &mut SafetyLedgerState) {
        let today = crate::models::local_date_string(Utc::now());
        if state.last_reset_date != today {
            state.last_reset_date = today;
            state.daily_loss_dollars = 0.0;
            state.daily_spent_dollars = 0.0;
            state.daily_trade_count = 0;
            state.daily_win_count = 0;
            state.daily_loss_count = 0;
            state.traded_windows.clear();
            self.bus.append_activity("safety_reset", "daily counters reset");
        }
    }

    pub fn can_trade(&self) -> CanTrade {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);

        if state.kill_switch {
            return CanTrade { allowed: false, reason: "kill switch active".into() };
        }
        if state.daily_loss_dollars >= self.daily_loss_limit {
            return CanTrade { allowed: false, reason: "daily loss limit reached".into() };
        }
        if state.daily_loss_count >= self.max_daily_losses {
            return CanTrade { allowed: false, reason: "max daily losses reached".into() };
        }
        CanTrade { allowed: true, reason: "ok".into() }
    }

    pub fn get_trade_size(&self, confidence: Confidence) -> f64 {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);

        let raw = match confidence {
            Confidence::High => self.max_trade_size,
            Confidence::Medium => self.max_trade_size / 2.0,
            Confidence::Low => 0.0,
        };

        if self.clamp_forward_loss_budget {
            let remaining = (self.daily_loss_limit - state.daily_loss_dollars).max(0.0);
            raw.min(remaining)
        } else {
            raw
        }
    }

    pub fn has_traded(&self, asset: &str, window: &str) -> bool {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);
        state.traded_windows.contains(&(asset.to_string(), window.to_string()))
    }

    /// Idempotent: repeated calls for the same key are a no-op.
    pub fn mark_traded(&self, asset: &str, window: &str) {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);
        state.traded_windows.insert((asset.to_string(), window.to_string()));
        self.bus.append_activity("traded_window", format!("{asset} {window} marked traded"));
    }

    pub fn record_trade(&self, dollars: f64) {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);
        state.daily_trade_count += 1;
        state.daily_spent_dollars += dollars;
        self.bus.append_activity("trade_recorded", format!("${dollars:.2}"));
    }

    pub fn record_win(&self, dollars: f64) {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);
        state.daily_win_count += 1;
        self.bus.append_activity("win_recorded", format!("${dollars:.2}"));
    }

    pub fn record_loss(&self, dollars: f64) {
        let mut state = self.state.lock();
        self.reset_daily_if_needed(&mut state);
        state.daily_loss_count += 1;
        state.daily_loss_dollars += dollars;
        self.bus.append_activity("loss_recorded", format!("${dollars:.2}"));
    }

    pub fn toggle_kill_switch(&self) -> bool {
        let mut state = self.state.lock();
        state.kill_switch = !state.kill_switch;
        self.bus.append_activity("kill_switch", format!("toggled to {}", state.kill_switch));
        state.kill_switch
    }

    pub fn set_kill_switch(&self, v: bool) {
        let mut state = self.state.lock();
        state.kill_switch = v;
        self.bus.append_activity("kill_switch", format!("set to {v}"));
    }

    pub fn get_window_key(&self, end_time: i64) -> String {
        window_key(end_time)
    }

    pub fn snapshot(&self) -> SafetyLedgerState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SafetyLedger {
        SafetyLedger::new(Arc::new(ActivityBus::new()), 200.0, 6, 50.0)
    }

    #[test]
    fn get_trade_size_by_confidence() {
        let l = ledger();
        assert_eq!(l.get_trade_size(Confidence::High), 50.0);
        assert_eq!(l.get_trade_size(Confidence::Medium), 25.0);
        assert_eq!(l.get_trade_size(Confidence::Low), 0.0);
    }

    #[test]
    fn mark_traded_is_idempotent_and_dedupes() {
        let l = ledger();
        assert!(!l.has_traded("btc", "20240101_0000"));
        l.mark_traded("btc", "20240101_0000");
        assert!(l.has_traded("btc", "20240101_0000"));
        l.mark_traded("btc", "20240101_0000");
        assert!(l.has_traded("btc", "20240101_0000"));
    }

    #[test]
    fn loss_cap_blocks_trading() {
        let l = ledger();
        for _ in 0..6 {
            l.record_loss(1.0);
        }
        assert!(!l.can_trade().allowed);
    }

    #[test]
    fn kill_switch_blocks_trading() {
        let l = ledger();
        assert!(l.can_trade().allowed);
        l.set_kill_switch(true);
        assert!(!l.can_trade().allowed);
    }

    #[test]
    fn daily_loss_dollar_cap_blocks_trading() {
        let l = ledger();
        l.record_loss(200.0);
        assert!(!l.can_trade().allowed);
    }
}
