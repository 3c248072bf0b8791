//! External HTTP/API surface — ingress handlers (§6).
//!
//! Every handler is a concurrent reader over in-memory state (activity
//! rings, safety ledger, redemption queue); none of them block on RPC or
//! CLOB calls. Grounded on the teacher's `main.rs` handler shape
//! (`AxumState<AppState>` + typed `Json` responses, `StatusCode` for the
//! handful of error paths) simplified to this crate's read-mostly surface.

use crate::activity::{ActivityEntry, DecisionEntry};
use crate::api::AppState;
use crate::models::{PriceContext, SafetyLedgerState, TradeRecord};
use crate::positions::PositionScanResult;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

fn limit_or_default(q: &LimitQuery) -> usize {
    q.limit.unwrap_or(100).min(500)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub is_running: bool,
    pub last_scan_time: i64,
    pub safety: SafetyLedgerState,
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        is_running: state.coordinator.is_running(),
        last_scan_time: state.coordinator.last_scan_time(),
        safety: state.safety.snapshot(),
    })
}

pub async fn get_activities(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Json<Vec<ActivityEntry>> {
    Json(state.bus.list_activities(limit_or_default(&q)))
}

pub async fn get_trades(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Json<Vec<TradeRecord>> {
    Json(state.bus.list_trades(limit_or_default(&q)))
}

pub async fn get_decisions(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Json<Vec<DecisionEntry>> {
    Json(state.bus.list_decisions(limit_or_default(&q)))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub daily_trade_count: u32,
    pub daily_win_count: u32,
    pub daily_loss_count: u32,
    pub daily_spent_dollars: f64,
    pub daily_loss_dollars: f64,
    pub trades_tracked: usize,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let safety = state.safety.snapshot();
    let trades = state.bus.list_trades(usize::MAX);
    Json(StatsResponse {
        daily_trade_count: safety.daily_trade_count,
        daily_win_count: safety.daily_win_count,
        daily_loss_count: safety.daily_loss_count,
        daily_spent_dollars: safety.daily_spent_dollars,
        daily_loss_dollars: safety.daily_loss_dollars,
        trades_tracked: trades.len(),
    })
}

pub async fn get_btc_price(State(state): State<AppState>) -> Json<PriceContext> {
    Json(state.feed.get_price_context())
}

#[derive(Debug, Serialize)]
pub struct RedemptionsResponse {
    pending: Vec<crate::models::PendingRedemption>,
    history: Vec<crate::models::PendingRedemption>,
    safe_address: Option<Address>,
    total_redeemed: usize,
    total_lost: usize,
}

pub async fn get_redemptions(State(state): State<AppState>) -> Json<RedemptionsResponse> {
    let history = state.queue.list_history();
    let total_redeemed = history.iter().filter(|e| e.status == crate::models::RedemptionStatus::Redeemed).count();
    let total_lost = history.iter().filter(|e| e.status == crate::models::RedemptionStatus::NoPayout).count();
    Json(RedemptionsResponse {
        pending: state.queue.list_pending(),
        history,
        safe_address: state.proxy_address,
        total_redeemed,
        total_lost,
    })
}

pub async fn get_positions(State(state): State<AppState>) -> Json<Option<PositionScanResult>> {
    Json(state.positions.last_result())
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub is_running: bool,
}

pub async fn post_bot_start(State(state): State<AppState>) -> Json<ToggleResponse> {
    state.coordinator.start();
    Json(ToggleResponse { is_running: state.coordinator.is_running() })
}

pub async fn post_bot_stop(State(state): State<AppState>) -> Json<ToggleResponse> {
    state.coordinator.stop();
    Json(ToggleResponse { is_running: state.coordinator.is_running() })
}

pub async fn post_bot_scan_now(State(state): State<AppState>) -> StatusCode {
    state.coordinator.tick().await;
    StatusCode::ACCEPTED
}

#[derive(Debug, Serialize)]
pub struct KillSwitchResponse {
    pub kill_switch: bool,
}

pub async fn post_killswitch(State(state): State<AppState>) -> Json<KillSwitchResponse> {
    let kill_switch = state.safety.toggle_kill_switch();
    Json(KillSwitchResponse { kill_switch })
}

pub async fn post_scan_positions(State(state): State<AppState>) -> Json<PositionScanResult> {
    Json(state.positions.scan_now(state.signer_address, state.proxy_address).await)
}

pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(limit_or_default(&LimitQuery { limit: Some(10_000) }), 500);
        assert_eq!(limit_or_default(&LimitQuery { limit: None }), 100);
    }
}
