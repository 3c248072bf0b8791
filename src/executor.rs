//! Order Executor (§4.G).
//!
//! `execute(decision, snapshot, sizeDollars) → Trade`, never throws.
//! Grounded directly on `clob.rs`'s `ClobClient::submit_order` (itself
//! grounded on the teacher's `vault/execution.rs` `PolymarketClobAdapter`
//! HMAC-signed order path): this module owns the price/size math and the
//! spec's explicit `RetryPolicy` value object around that one call — the
//! teacher's adapter had no retry loop; that is a supplemented feature per
//! spec.md §4.G point 5 and the §9 design note "ad-hoc retries and backoff
//! → explicit retry policies".

use crate::clob::{ClobClient, OrderPayload};
use crate::models::{Action, Decision, MarketSnapshot, Side, TokenSnapshot, TradeRecord, TradeResult};
use std::time::Duration;

/// Rounds `size / price` down to 2 decimal places (whole cents of shares).
fn floor2(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    (price / tick_size).round() * tick_size
}

#[derive(Debug, Clone, Copy)]
pub enum RetryClass {
    /// CLOB returns a non-OK body that isn't a hard reject.
    Soft,
    /// 403 / geoblock / "blocked" — identical mechanism, doubled backoff,
    /// recorded as "rate-limited" per spec.md §7.
    Hard,
}

/// Explicit retry policy; no open-coded retry loop elsewhere in this crate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub soft_backoff: Duration,
    pub hard_backoff: Duration,
}

impl RetryPolicy {
    /// Up to 3 attempts, `3s·attempt` soft backoff, `5s·attempt` hard backoff.
    pub fn model_scored() -> Self {
        Self { max_attempts: 3, soft_backoff: Duration::from_secs(3), hard_backoff: Duration::from_secs(5) }
    }

    /// The spike strategy path has no distinct retry shape specified beyond
    /// "may use a higher fee-rate limit" (§4.G step 4); same ladder applies.
    pub fn spike() -> Self {
        Self::model_scored()
    }

    fn backoff_for(&self, class: RetryClass, attempt: u32) -> Duration {
        match class {
            RetryClass::Soft => self.soft_backoff * attempt,
            RetryClass::Hard => self.hard_backoff * attempt,
        }
    }
}

pub struct OrderExecutor<'a> {
    clob: &'a ClobClient,
    address: String,
    retry: RetryPolicy,
}

impl<'a> OrderExecutor<'a> {
    pub fn new(clob: &'a ClobClient, address: impl Into<String>, retry: RetryPolicy) -> Self {
        Self { clob, address: address.into(), retry }
    }

    fn pick_token<'s>(snapshot: &'s MarketSnapshot, side: Side) -> &'s TokenSnapshot {
        match side {
            Side::Yes => &snapshot.yes_token,
            Side::No => &snapshot.no_token,
        }
    }

    fn classify_error(err: &anyhow::Error) -> RetryClass {
        let msg = err.to_string().to_lowercase();
        if msg.contains("403") || msg.contains("blocked") || msg.contains("hard_reject") {
            RetryClass::Hard
        } else {
            RetryClass::Soft
        }
    }

    /// Submit a BUY_YES/BUY_NO decision. Returns a structured `TradeRecord`;
    /// `result` is `pending` on success, `failed` on exhaustion. Never
    /// returns an `Err` — every failure mode is represented in the record.
    pub async fn execute(&self, decision: &Decision, snapshot: &MarketSnapshot, size_dollars: f64) -> TradeRecord {
        let side = match decision.action {
            Action::BuyYes => Side::Yes,
            Action::BuyNo => Side::No,
            Action::Skip => unreachable!("coordinator must not call execute() for SKIP"),
        };

        let token = Self::pick_token(snapshot, side);
        let market_token = match side {
            Side::Yes => &snapshot.market.tokens[0],
            Side::No => &snapshot.market.tokens[1],
        };

        let raw_price = token.price.buy.or(token.price.mid).unwrap_or(0.5);
        let price = round_to_tick(raw_price, snapshot.market.tick_size).clamp(0.01, 0.99);
        let shares = floor2(size_dollars / price);

        let mut last_error: Option<String> = None;
        for attempt in 1..=self.retry.max_attempts {
            let order = OrderPayload {
                token_id: market_token.token_id.clone(),
                price: format!("{price:.2}"),
                size: format!("{shares:.2}"),
                side: "BUY".to_string(),
                order_type: "GTC".to_string(),
                time_in_force: "GTC".to_string(),
            };

            match self.clob.submit_order(&self.address, &order).await {
                Ok(resp) if resp.order_id.is_some() => {
                    return self.build_trade(decision, side, market_token.token_id.clone(), &snapshot.market, size_dollars, price, resp.order_id, TradeResult::Pending);
                }
                Ok(resp) => {
                    last_error = resp.error_msg.or(Some("order rejected without id".to_string()));
                }
                Err(e) => {
                    let class = Self::classify_error(&e);
                    last_error = Some(e.to_string());
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff_for(class, attempt)).await;
                    }
                    continue;
                }
            }
            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.backoff_for(RetryClass::Soft, attempt)).await;
            }
        }

        tracing::warn!(error = ?last_error, "order executor exhausted retries");
        self.build_trade(decision, side, market_token.token_id.clone(), &snapshot.market, size_dollars, price, None, TradeResult::Failed)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_trade(
        &self,
        decision: &Decision,
        side: Side,
        token_id: String,
        market: &crate::models::MarketRecord,
        size: f64,
        price: f64,
        order_id: Option<String>,
        result: TradeResult,
    ) -> TradeRecord {
        TradeRecord {
            id: 0, // assigned by ActivityBus::append_trade
            timestamp: 0,
            action: decision.action,
            side,
            token_id,
            condition_id: market.condition_id.clone(),
            size,
            price,
            order_id,
            result,
            question: market.question.clone(),
            market_end_time: market.end_time,
            neg_risk: market.neg_risk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor2_truncates_to_cents() {
        assert_eq!(floor2(10.0 / 3.0), 3.33);
        assert_eq!(floor2(1.0), 1.0);
    }

    #[test]
    fn round_to_tick_snaps_to_increment() {
        assert!((round_to_tick(0.473, 0.01) - 0.47).abs() < 1e-9);
        assert!((round_to_tick(0.476, 0.01) - 0.48).abs() < 1e-9);
    }

    #[test]
    fn retry_policy_backoff_scales_linearly_with_attempt() {
        let policy = RetryPolicy::model_scored();
        assert_eq!(policy.backoff_for(RetryClass::Soft, 1), Duration::from_secs(3));
        assert_eq!(policy.backoff_for(RetryClass::Soft, 2), Duration::from_secs(6));
        assert_eq!(policy.backoff_for(RetryClass::Hard, 1), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(RetryClass::Hard, 2), Duration::from_secs(10));
    }

    #[test]
    fn classify_error_detects_hard_reject() {
        let hard = anyhow::anyhow!("hard_reject: 403 forbidden");
        assert!(matches!(OrderExecutor::classify_error(&hard), RetryClass::Hard));
        let soft = anyhow::anyhow!("insufficient liquidity");
        assert!(matches!(OrderExecutor::classify_error(&soft), RetryClass::Soft));
    }
}
