//! Position Discovery (§4.J).
//!
//! A startup scan (idempotent via `hasScanned`) plus a manual trigger,
//! enumerating redeemable positions for both the signer and its proxy
//! wallet from an off-chain positions index, and enqueuing the redeemable
//! ones into the pending-redemption queue with a synthetic
//! `marketEndTime = now − 10min` so the next tick's grace window (§4.I
//! step 5, 2min) already includes them. Grounded on
//! `other_examples/…monodexr-polymarket-arb…redemption.rs`'s
//! `track_position` / queue-append idiom, generalized from "one tracked
//! position" to "scan an index for both wallets and merge."

use crate::models::{PendingRedemption, RedemptionStatus};
use crate::redemption::queue::PendingRedemptionQueue;
use ethers::types::Address;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RawPosition {
    #[serde(rename = "conditionId")]
    condition_id: Option<String>,
    #[serde(rename = "asset", alias = "tokenId")]
    token_id: Option<String>,
    #[serde(default)]
    size: f64,
    #[serde(rename = "curPrice", default)]
    cur_price: f64,
    #[serde(default)]
    redeemable: bool,
    #[serde(rename = "negRisk", default)]
    neg_risk: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PositionScanResult {
    pub scanned_at: i64,
    pub enqueued: usize,
    pub skipped: usize,
}

pub struct PositionDiscovery {
    http: reqwest::Client,
    positions_index_url: String,
    queue: Arc<PendingRedemptionQueue>,
    has_scanned: AtomicBool,
    last_result: Mutex<Option<PositionScanResult>>,
}

impl PositionDiscovery {
    pub fn new(positions_index_url: impl Into<String>, queue: Arc<PendingRedemptionQueue>) -> Self {
        Self {
            http: reqwest::Client::new(),
            positions_index_url: positions_index_url.into(),
            queue,
            has_scanned: AtomicBool::new(false),
            last_result: Mutex::new(None),
        }
    }

    /// Last completed scan, for `GET /api/positions`.
    pub fn last_result(&self) -> Option<PositionScanResult> {
        self.last_result.lock().clone()
    }

    /// Called once at startup; no-op on subsequent calls unless
    /// `scan_now` is used instead.
    pub async fn scan_at_startup(&self, signer: Address, proxy: Option<Address>) -> Option<PositionScanResult> {
        if self.has_scanned.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(self.scan_now(signer, proxy).await)
    }

    /// Manual trigger (`POST /api/scan-positions`); always runs.
    pub async fn scan_now(&self, signer: Address, proxy: Option<Address>) -> PositionScanResult {
        let mut all = self.fetch_positions(signer).await;
        if let Some(proxy) = proxy {
            all.extend(self.fetch_positions(proxy).await);
        }

        let mut enqueued = 0usize;
        let mut skipped = 0usize;
        let now = chrono::Utc::now().timestamp();

        for pos in all {
            if pos.size <= 0.0 {
                skipped += 1;
                continue;
            }
            let Some(condition_id) = pos.condition_id.clone() else {
                skipped += 1;
                continue;
            };
            // "Skip curPrice == 0 as lost without enqueuing."
            if pos.cur_price == 0.0 {
                skipped += 1;
                continue;
            }
            let is_candidate = pos.cur_price == 1.0 || pos.redeemable;
            if !is_candidate {
                skipped += 1;
                continue;
            }

            self.queue.append(PendingRedemption {
                condition_id,
                token_id: pos.token_id.clone(),
                neg_risk: pos.neg_risk,
                market_end_time: now - 10 * 60,
                added_at: now,
                status: RedemptionStatus::Waiting,
                tx_hash: None,
                redeemed_at: None,
                error: None,
            });
            enqueued += 1;
        }

        let result = PositionScanResult { scanned_at: now, enqueued, skipped };
        *self.last_result.lock() = Some(result.clone());
        result
    }

    async fn fetch_positions(&self, owner: Address) -> Vec<RawPosition> {
        let resp = self
            .http
            .get(&self.positions_index_url)
            .timeout(Duration::from_secs(10))
            .query(&[("user", format!("{owner:#x}"))])
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => r.json().await.unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_at_startup_is_idempotent() {
        let queue = Arc::new(PendingRedemptionQueue::new());
        let discovery = PositionDiscovery::new("https://example.invalid/positions", queue);
        let signer: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        // First call runs (network failure -> empty result, but still marks hasScanned).
        let first = discovery.scan_at_startup(signer, None).await;
        assert!(first.is_some());
        let second = discovery.scan_at_startup(signer, None).await;
        assert!(second.is_none());
    }
}
