//! External HTTP/API surface (§6) — out of core per spec.md §1, wired here
//! as the one place that turns the in-process subsystems into Axum routes.
//! `AppState` is a flat bag of `Arc`s; every handler in `routes` is a
//! concurrent reader over it, matching the teacher's `AppState` shape in
//! `main.rs` (clone-cheap state struct threaded through `.with_state`).

pub mod routes;

use crate::activity::ActivityBus;
use crate::coordinator::BotLoopCoordinator;
use crate::positions::PositionDiscovery;
use crate::redemption::queue::PendingRedemptionQueue;
use crate::safety::SafetyLedger;
use axum::routing::{get, post};
use axum::Router;
use ethers::types::Address;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<ActivityBus>,
    pub safety: Arc<SafetyLedger>,
    pub feed: Arc<crate::feed::ReferencePriceFeed>,
    pub queue: Arc<PendingRedemptionQueue>,
    pub positions: Arc<PositionDiscovery>,
    pub coordinator: Arc<BotLoopCoordinator>,
    pub signer_address: Address,
    pub proxy_address: Option<Address>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .route("/api/activities", get(routes::get_activities))
        .route("/api/trades", get(routes::get_trades))
        .route("/api/decisions", get(routes::get_decisions))
        .route("/api/stats", get(routes::get_stats))
        .route("/api/btc-price", get(routes::get_btc_price))
        .route("/api/redemptions", get(routes::get_redemptions))
        .route("/api/positions", get(routes::get_positions))
        .route("/api/bot/start", post(routes::post_bot_start))
        .route("/api/bot/stop", post(routes::post_bot_stop))
        .route("/api/bot/scan-now", post(routes::post_bot_scan_now))
        .route("/api/killswitch", post(routes::post_killswitch))
        .route("/api/scan-positions", post(routes::post_scan_positions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
