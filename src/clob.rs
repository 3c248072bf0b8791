//! CLOB HTTP client: public market-data endpoints plus HMAC-authenticated
//! order submission. Grounded directly on `vault/execution.rs`'s
//! `PolymarketClobAdapter` (`sign_request`, `auth_headers`, credential
//! struct with a redacting `Debug` impl). The wire-level details of the
//! auth library itself are out of scope per spec.md §1 — this module is
//! the typed client the spec treats as a boundary.

use anyhow::{Context, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct ClobCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for ClobCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobCredentials").field("api_key", &"<redacted>").finish()
    }
}

impl ClobCredentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: std::env::var("POLY_API_KEY").ok()?,
            secret: std::env::var("POLY_API_SECRET").ok()?,
            passphrase: std::env::var("POLY_API_PASSPHRASE").ok()?,
        })
    }
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| serde::de::Error::custom("invalid number")),
        serde_json::Value::String(s) => s.parse().map_err(|_| serde::de::Error::custom("invalid float string")),
        _ => Err(serde::de::Error::custom("expected string or number")),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Level {
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(deserialize_with = "de_f64")]
    pub size: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBook {
    #[serde(default)]
    pub bids: Vec<Level>,
    #[serde(default)]
    pub asks: Vec<Level>,
}

pub struct ClobClient {
    http: reqwest::Client,
    host: String,
    creds: Option<ClobCredentials>,
}

impl ClobClient {
    pub fn new(host: impl Into<String>, creds: Option<ClobCredentials>) -> Self {
        Self { http: reqwest::Client::new(), host: host.into(), creds }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// `GET /price?token_id=&side=`. Null on failure, 10s timeout.
    pub async fn price(&self, token_id: &str, side: &str) -> Option<f64> {
        let resp = self
            .http
            .get(self.url("/price"))
            .timeout(Duration::from_secs(10))
            .query(&[("token_id", token_id), ("side", side)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let v: serde_json::Value = resp.json().await.ok()?;
        v.get("price").and_then(|p| p.as_str().and_then(|s| s.parse().ok()).or_else(|| p.as_f64()))
    }

    /// `GET /midpoint?token_id=`.
    pub async fn midpoint(&self, token_id: &str) -> Option<f64> {
        let resp = self
            .http
            .get(self.url("/midpoint"))
            .timeout(Duration::from_secs(10))
            .query(&[("token_id", token_id)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let v: serde_json::Value = resp.json().await.ok()?;
        v.get("mid").and_then(|p| p.as_str().and_then(|s| s.parse().ok()).or_else(|| p.as_f64()))
    }

    /// `GET /book?token_id=`.
    pub async fn book(&self, token_id: &str) -> Option<RawBook> {
        let resp = self
            .http
            .get(self.url("/book"))
            .timeout(Duration::from_secs(10))
            .query(&[("token_id", token_id)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json().await.ok()
    }

    /// `GET /spread?token_id=`.
    pub async fn spread(&self, token_id: &str) -> Option<f64> {
        let resp = self
            .http
            .get(self.url("/spread"))
            .timeout(Duration::from_secs(10))
            .query(&[("token_id", token_id)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let v: serde_json::Value = resp.json().await.ok()?;
        v.get("spread").and_then(|p| p.as_str().and_then(|s| s.parse().ok()).or_else(|| p.as_f64()))
    }

    /// `GET /prices-history?market=&fidelity=1`. Falls back to a history
    /// endpoint variant if the primary returns non-OK.
    pub async fn prices_history(&self, token_id: &str) -> Vec<(i64, f64)> {
        let primary = self
            .http
            .get(self.url("/prices-history"))
            .timeout(Duration::from_secs(10))
            .query(&[("market", token_id), ("fidelity", "1")])
            .send()
            .await;

        let resp = match primary {
            Ok(r) if r.status().is_success() => r,
            _ => match self
                .http
                .get(self.url("/prices-history"))
                .timeout(Duration::from_secs(10))
                .query(&[("market", token_id), ("interval", "1m")])
                .send()
                .await
            {
                Ok(r) if r.status().is_success() => r,
                _ => return Vec::new(),
            },
        };

        let Ok(v) = resp.json::<serde_json::Value>().await else { return Vec::new() };
        v.get("history")
            .and_then(|h| h.as_array())
            .map(|points| {
                points
                    .iter()
                    .filter_map(|p| Some((p.get("t")?.as_i64()?, p.get("p")?.as_f64()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sign_request(&self, creds: &ClobCredentials, method: &str, path: &str, body: &str, timestamp: &str) -> Result<String> {
        let message = format!("{timestamp}{method}{path}{body}");
        let secret_bytes = base64::engine::general_purpose::URL_SAFE
            .decode(&creds.secret)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&creds.secret))
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(&creds.secret))
            .context("invalid CLOB API secret encoding")?;
        let mut mac = HmacSha256::new_from_slice(&secret_bytes).context("hmac key")?;
        mac.update(message.as_bytes());
        Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    fn auth_headers(&self, creds: &ClobCredentials, address: &str, method: &str, path: &str, body: &str) -> Result<Vec<(&'static str, String)>> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign_request(creds, method, path, body, &timestamp)?;
        Ok(vec![
            ("POLY_ADDRESS", address.to_string()),
            ("POLY_API_KEY", creds.api_key.clone()),
            ("POLY_SIGNATURE", signature),
            ("POLY_TIMESTAMP", timestamp),
            ("POLY_PASSPHRASE", creds.passphrase.clone()),
        ])
    }

    pub async fn submit_order(&self, address: &str, order: &OrderPayload) -> Result<OrderResponse> {
        let creds = self.creds.as_ref().context("CLOB credentials not configured")?;
        let path = "/order";
        let body = serde_json::to_string(order)?;
        let headers = self.auth_headers(creds, address, "POST", path, &body)?;

        let mut req = self.http.post(self.url(path)).timeout(Duration::from_secs(10)).body(body);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let resp = req.send().await.context("order submission request failed")?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if status.as_u16() == 403 || text.to_lowercase().contains("blocked") {
            anyhow::bail!("hard_reject: {text}");
        }
        serde_json::from_str(&text).with_context(|| format!("order response parse failed: {text}"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPayload {
    pub token_id: String,
    pub price: String,
    pub size: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    #[serde(alias = "orderID", alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(alias = "errorMsg", alias = "error", default)]
    pub error_msg: Option<String>,
}
