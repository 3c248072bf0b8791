//! Process bootstrap: loads configuration, wires the subsystems of §4
//! together (explicit dependency injection per §9 "mutable globals →
//! explicit modules"), starts the coordinator's tick loop, and serves the
//! read-model/control HTTP surface (§6, out of core). Grounded on the
//! teacher's `main.rs` overall shape (env config, tracing init, background
//! tasks spawned before `axum::serve`), generalized down to this crate's
//! much narrower subsystem set.

use anyhow::Context;
use clap::Parser;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use updown_agent::activity::ActivityBus;
use updown_agent::api::{self, AppState};
use updown_agent::clob::{ClobClient, ClobCredentials};
use updown_agent::config::Cli;
use updown_agent::coordinator::{BotLoopCoordinator, StrategyMode};
use updown_agent::discovery::MarketDiscovery;
use updown_agent::executor::RetryPolicy;
use updown_agent::feed::ReferencePriceFeed;
use updown_agent::policy::{DecisionPolicy, ModelScoredPolicy, SpikeDetectorPolicy};
use updown_agent::positions::PositionDiscovery;
use updown_agent::redemption::queue::PendingRedemptionQueue;
use updown_agent::redemption::{chain, proxy::ProxyWalletResolver, wallet_from_private_key, RedemptionEngine};
use updown_agent::safety::SafetyLedger;
use updown_agent::Config;

/// Polygon mainnet — the only chain the redemption engine targets.
const CHAIN_ID: u64 = 137;

/// Best-effort proxy-wallet resolution used once at startup, independent
/// of the redemption engine's own per-tick resolver (§4.I "Proxy-wallet
/// discovery" — the cached address is process-lifetime, so computing it
/// twice costs one extra RPC round-trip at boot, not correctness).
async fn resolve_proxy_at_startup(config: &Config, wallet: &LocalWallet) -> Option<Address> {
    let provider = chain::connect_provider(&config.polygon_rpc_url, &config.polygon_rpc_fallbacks).await;
    let client = chain::build_client(provider, wallet.clone(), CHAIN_ID);
    let known_proxy_wallet = config.known_proxy_wallet.as_deref().and_then(|s| s.parse::<Address>().ok());
    let resolver = ProxyWalletResolver::new(known_proxy_wallet);
    resolver.resolve(&client, wallet.address()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(cli.log_level.as_deref().unwrap_or("info")))
                .unwrap(),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = cli.port.unwrap_or(config.port);
    info!(mode = %config.strategy_mode, asset = %config.reference_asset, "starting up/down trading agent");

    let bus = Arc::new(ActivityBus::new());
    let safety = Arc::new(SafetyLedger::new(bus.clone(), config.daily_loss_limit, config.max_daily_losses, config.max_trade_size));

    let feed = ReferencePriceFeed::new(config.ticker_ws_url.clone(), config.ticker_symbol.clone());
    feed.spawn();

    let http = reqwest::Client::new();
    let discovery = MarketDiscovery::new(http.clone(), config.events_index_url.clone());

    let clob_creds = ClobCredentials::from_env();
    if clob_creds.is_none() {
        warn!("no CLOB credentials configured; order submission will fail until POLY_API_* is set");
    }
    let clob = ClobClient::new(config.clob_host.clone(), clob_creds);

    let wallet_key = config.wallet_private_key.as_deref().context("WALLET_PRIVATE_KEY is required to sign redemptions")?;
    let wallet = wallet_from_private_key(wallet_key).context("parsing WALLET_PRIVATE_KEY")?;
    let signer_address = wallet.address();
    let executor_address = format!("{signer_address:#x}");

    let proxy_address = resolve_proxy_at_startup(&config, &wallet).await;
    info!(signer = %executor_address, proxy = ?proxy_address, "resolved on-chain identity");

    let queue = Arc::new(PendingRedemptionQueue::new());
    let known_proxy_wallet = config.known_proxy_wallet.as_deref().and_then(|s| s.parse::<Address>().ok());
    let redemption = Arc::new(RedemptionEngine::new(
        bus.clone(),
        queue.clone(),
        config.polygon_rpc_url.clone(),
        config.polygon_rpc_fallbacks.clone(),
        wallet.clone(),
        CHAIN_ID,
        known_proxy_wallet,
    ));

    let positions = Arc::new(PositionDiscovery::new(config.positions_index_url.clone(), queue.clone()));
    {
        let positions = positions.clone();
        tokio::spawn(async move {
            if let Some(result) = positions.scan_at_startup(signer_address, proxy_address).await {
                info!(enqueued = result.enqueued, skipped = result.skipped, "startup position scan complete");
            }
        });
    }

    let mode = match config.strategy_mode.as_str() {
        "model" => StrategyMode::Model,
        _ => StrategyMode::Spike,
    };
    let retry_policy = match mode {
        StrategyMode::Spike => RetryPolicy::spike(),
        StrategyMode::Model => RetryPolicy::model_scored(),
    };
    let model_policy: Option<Arc<dyn DecisionPolicy>> = match (mode, &config.model_scoring_endpoint) {
        (StrategyMode::Model, Some(endpoint)) => Some(Arc::new(ModelScoredPolicy::new(endpoint.clone()))),
        (StrategyMode::Model, None) => {
            warn!("STRATEGY_MODE=model but MODEL_SCORING_ENDPOINT is unset; every decision will skip");
            None
        }
        (StrategyMode::Spike, _) => None,
    };

    let coordinator = Arc::new(BotLoopCoordinator::new(
        bus.clone(),
        safety.clone(),
        feed.clone(),
        discovery,
        clob,
        executor_address,
        retry_policy,
        model_policy,
        mode,
        redemption,
        queue.clone(),
        config.reference_asset.clone(),
        config.max_entry_price,
        SpikeDetectorPolicy { threshold_dollars: config.spike_threshold, min_speed: config.min_spike_speed },
    ));
    coordinator.start();

    {
        let coordinator = coordinator.clone();
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(config.scan_interval_secs));
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                coordinator.tick().await;
            }
        });
    }

    let state = AppState {
        bus,
        safety,
        feed,
        queue,
        positions,
        coordinator,
        signer_address,
        proxy_address,
    };
    let app = api::router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
