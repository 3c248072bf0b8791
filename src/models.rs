//! Core data model shared by every subsystem.
//!
//! Every external payload is normalized into these typed records at the
//! boundary (see `discovery`, `fetcher`, `policy`, `positions`); nothing
//! downstream of this module ever sees raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type Money = f64;

/// A single reference-price tick: `{price, bid, ask, t}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: Money,
    pub bid: Money,
    pub ask: Money,
    pub t: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rising,
    Falling,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Momentum {
    Accelerating,
    Decelerating,
    Stable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Change {
    pub dollars: f64,
    pub percent: f64,
}

/// Derived, never stored: a read-time snapshot of the feed's recent behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceContext {
    pub available: bool,
    pub current: Money,
    pub bid: Money,
    pub ask: Money,
    pub change_60: Change,
    pub change_180: Change,
    pub change_300: Change,
    pub change_600: Change,
    pub direction: Direction,
    pub momentum: Momentum,
    pub recent_volatility: f64,
}

impl Default for PriceContext {
    fn default() -> Self {
        Self {
            available: false,
            current: 0.0,
            bid: 0.0,
            ask: 0.0,
            change_60: Change { dollars: 0.0, percent: 0.0 },
            change_180: Change { dollars: 0.0, percent: 0.0 },
            change_300: Change { dollars: 0.0, percent: 0.0 },
            change_600: Change { dollars: 0.0, percent: 0.0 },
            direction: Direction::Flat,
            momentum: Momentum::Stable,
            recent_volatility: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketToken {
    pub token_id: String,
    pub outcome: Outcome,
}

/// Identity `conditionId`. Constructed per scan cycle, not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub condition_id: String,
    pub question: String,
    pub end_time: i64,
    pub tokens: [MarketToken; 2],
    pub neg_risk: bool,
    pub tick_size: f64,
    pub asset: String,
}

impl MarketRecord {
    pub fn token_for(&self, outcome: Outcome) -> Option<&MarketToken> {
        self.tokens.iter().find(|t| t.outcome == outcome)
    }

    pub fn minutes_left(&self, now: i64) -> f64 {
        (self.end_time - now) as f64 / 60.0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenPrice {
    pub buy: Option<Money>,
    pub sell: Option<Money>,
    pub mid: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub bid_vol: f64,
    pub ask_vol: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub t: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub price: TokenPrice,
    pub book: OrderBookSnapshot,
}

/// Produced fresh per decision by the Market-Data Fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market: MarketRecord,
    pub yes_token: TokenSnapshot,
    pub no_token: TokenSnapshot,
    pub price_history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    BuyYes,
    BuyNo,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// `confidence==LOW ⇒ action=SKIP`, normalized at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub confidence: Confidence,
    pub pattern: String,
    pub reasoning: String,
}

impl Decision {
    pub fn new(action: Action, confidence: Confidence, pattern: impl Into<String>, reasoning: impl Into<String>) -> Self {
        let (action, confidence) = if confidence == Confidence::Low {
            (Action::Skip, Confidence::Low)
        } else {
            (action, confidence)
        };
        Self { action, confidence, pattern: pattern.into(), reasoning: reasoning.into() }
    }

    pub fn skip(reasoning: impl Into<String>) -> Self {
        Self { action: Action::Skip, confidence: Confidence::Low, pattern: "none".to_string(), reasoning: reasoning.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl From<Action> for Option<Side> {
    fn from(a: Action) -> Self {
        match a {
            Action::BuyYes => Some(Side::Yes),
            Action::BuyNo => Some(Side::No),
            Action::Skip => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Pending,
    Win,
    Loss,
    Failed,
}

/// Created on executor success; `result` updated later by reconciliation
/// that is not owned by this crate's core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: u64,
    pub timestamp: i64,
    pub action: Action,
    pub side: Side,
    pub token_id: String,
    pub condition_id: String,
    pub size: Money,
    pub price: f64,
    pub order_id: Option<String>,
    pub result: TradeResult,
    pub question: String,
    pub market_end_time: i64,
    pub neg_risk: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionStatus {
    Waiting,
    Redeeming,
    Redeemed,
    NoPayout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRedemption {
    pub condition_id: String,
    pub token_id: Option<String>,
    pub neg_risk: bool,
    pub market_end_time: i64,
    pub added_at: i64,
    pub status: RedemptionStatus,
    pub tx_hash: Option<String>,
    pub redeemed_at: Option<i64>,
    pub error: Option<String>,
}

impl PendingRedemption {
    /// Primary key: `conditionId`, falling back to `tokenId` if absent.
    pub fn key(&self) -> &str {
        self.token_id.as_deref().filter(|_| self.condition_id.is_empty()).unwrap_or(&self.condition_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyLedgerState {
    pub kill_switch: bool,
    pub daily_loss_dollars: f64,
    pub daily_spent_dollars: f64,
    pub daily_trade_count: u32,
    pub daily_win_count: u32,
    pub daily_loss_count: u32,
    pub last_reset_date: String,
    #[serde(skip)]
    pub traded_windows: BTreeSet<(String, String)>,
}

/// Derive the canonical `YYYYMMDD_HHMM` window key from a UTC end-time.
pub fn window_key(end_time: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp(end_time, 0).unwrap_or_else(Utc::now);
    dt.format("%Y%m%d_%H%M").to_string()
}

pub fn local_date_string(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Pad/normalize a conditionId into a canonical `0x`-prefixed 64-hex-char string.
/// Idempotent: `normalize(normalize(x)) == normalize(x)` for acceptable inputs.
pub fn normalize_condition_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.is_empty() || hex_part.len() > 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{:0>64}", hex_part.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_low_confidence_normalizes_to_skip() {
        let d = Decision::new(Action::BuyYes, Confidence::Low, "spike", "weak");
        assert_eq!(d.action, Action::Skip);
    }

    #[test]
    fn normalize_condition_id_is_idempotent() {
        let bare = "abc123";
        let once = normalize_condition_id(bare).unwrap();
        let twice = normalize_condition_id(&once).unwrap();
        assert_eq!(once, twice);

        let padded = "0x00000000000000000000000000000000000000000000000000000000abc123";
        assert_eq!(normalize_condition_id(padded).unwrap(), once);
    }

    #[test]
    fn normalize_condition_id_rejects_non_hex() {
        assert!(normalize_condition_id("not-hex!!").is_none());
    }

    #[test]
    fn window_key_format() {
        // 2024-01-01T00:15:00Z
        let k = window_key(1704067200 + 15 * 60);
        assert_eq!(k, "20240101_0015");
    }
}
