//! Process configuration, loaded once at startup from the environment.
//!
//! Mirrors the teacher's `Config::from_env` shape: `dotenv().ok()` first,
//! then each key is `env::var(..).unwrap_or_else(default).parse().unwrap_or(default)`.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    pub scan_interval_secs: u64,
    pub max_trade_size: f64,
    pub daily_loss_limit: f64,
    pub max_daily_losses: u32,
    pub spike_threshold: f64,
    pub min_spike_speed: f64,
    pub max_entry_price: f64,

    pub polygon_rpc_url: String,
    pub polygon_rpc_fallbacks: Vec<String>,
    pub wallet_private_key: Option<String>,
    pub known_proxy_wallet: Option<String>,

    pub poly_api_key: Option<String>,
    pub poly_api_secret: Option<String>,
    pub poly_api_passphrase: Option<String>,

    pub ticker_ws_url: String,
    pub ticker_symbol: String,
    pub reference_asset: String,

    pub events_index_url: String,
    pub clob_host: String,
    pub positions_index_url: String,

    /// "spike" (deterministic fast path) or "model" (scored policy, §4.F).
    pub strategy_mode: String,
    pub model_scoring_endpoint: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = env_parse("PORT", 8080u16);

        let scan_interval_secs = env_parse("SCAN_INTERVAL", 15u64);
        let max_trade_size = env_parse("MAX_TRADE_SIZE", 50.0);
        let daily_loss_limit = env_parse("DAILY_LOSS_LIMIT", 200.0);
        let max_daily_losses = env_parse("MAX_DAILY_LOSSES", 6u32);
        let spike_threshold = env_parse("SPIKE_THRESHOLD", 30.0);
        let min_spike_speed = env_parse("MIN_SPIKE_SPEED", 15.0);
        let max_entry_price = env_parse("MAX_ENTRY_PRICE", 0.45);

        let polygon_rpc_url = env_or("POLYGON_RPC_URL", "https://polygon-rpc.com");
        let polygon_rpc_fallbacks = vec![
            "https://1rpc.io/matic".to_string(),
            "https://rpc.ankr.com/polygon".to_string(),
            "https://polygon.llamarpc.com".to_string(),
        ];
        let wallet_private_key = env::var("WALLET_PRIVATE_KEY").ok();
        let known_proxy_wallet = env::var("KNOWN_PROXY_WALLET").ok();

        let poly_api_key = env::var("POLY_API_KEY").ok();
        let poly_api_secret = env::var("POLY_API_SECRET").ok();
        let poly_api_passphrase = env::var("POLY_API_PASSPHRASE").ok();

        let ticker_ws_url = env_or("TICKER_WS_URL", "wss://stream.example-ticker.com/ws");
        let ticker_symbol = env_or("TICKER_SYMBOL", "BTC/USD");
        let reference_asset = env_or("REFERENCE_ASSET", "btc");

        let events_index_url = env_or("EVENTS_INDEX_URL", "https://gamma-api.polymarket.com/markets");
        let clob_host = env_or("CLOB_HOST", "https://clob.polymarket.com");
        let positions_index_url = env_or("POSITIONS_INDEX_URL", "https://data-api.polymarket.com/positions");

        let strategy_mode = env_or("STRATEGY_MODE", "spike");
        let model_scoring_endpoint = env::var("MODEL_SCORING_ENDPOINT").ok();

        Ok(Self {
            port,
            scan_interval_secs,
            max_trade_size,
            daily_loss_limit,
            max_daily_losses,
            spike_threshold,
            min_spike_speed,
            max_entry_price,
            polygon_rpc_url,
            polygon_rpc_fallbacks,
            wallet_private_key,
            known_proxy_wallet,
            poly_api_key,
            poly_api_secret,
            poly_api_passphrase,
            ticker_ws_url,
            ticker_symbol,
            reference_asset,
            events_index_url,
            clob_host,
            positions_index_url,
            strategy_mode,
            model_scoring_endpoint,
        })
    }
}

/// Process-start CLI overrides. Pure ambient ergonomics; spec.md is silent here.
#[derive(Debug, clap::Parser)]
#[command(name = "updown-agent")]
pub struct Cli {
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,
}
