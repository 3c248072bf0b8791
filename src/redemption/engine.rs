//! Redemption Engine (§4.I) — the most intricate subsystem.
//!
//! Runs once per scan tick, self-mutexed via an `isChecking` latch so a
//! slow tick cannot overlap the next timer fire. Walks the pending queue,
//! resolves each candidate against on-chain state, and redeems through a
//! fallback ladder (neg-risk adapter, then plain conditional-tokens),
//! either directly from the signer or via a co-signed proxy wallet.
//! New code — the teacher has no on-chain surface; see `chain.rs`'s module
//! doc for the pack files this is grounded on.

use crate::activity::ActivityBus;
use crate::models::{PendingRedemption, RedemptionStatus};
use crate::redemption::chain::{
    self, ChainClient, ConditionalTokensContract, NegRiskAdapterContract, SafeProxyContract,
    CTF_ADDRESS, NEG_RISK_ADAPTER_ADDRESS, USDC_ADDRESS,
};
use crate::redemption::proxy::ProxyWalletResolver;
use crate::redemption::queue::PendingRedemptionQueue;
use ethers::prelude::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which rung of the fallback ladder is being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rung {
    NegRisk,
    Plain,
}

impl Rung {
    fn target_address(self) -> &'static str {
        match self {
            Rung::NegRisk => NEG_RISK_ADAPTER_ADDRESS,
            Rung::Plain => CTF_ADDRESS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Rung::NegRisk => "NegRiskAdapter",
            Rung::Plain => "CTF",
        }
    }
}

pub struct RedemptionEngine {
    bus: Arc<ActivityBus>,
    queue: Arc<PendingRedemptionQueue>,
    proxy_resolver: ProxyWalletResolver,
    is_checking: AtomicBool,
    rpc_primary: String,
    rpc_fallbacks: Vec<String>,
    wallet: LocalWallet,
    chain_id: u64,
}

impl RedemptionEngine {
    pub fn new(
        bus: Arc<ActivityBus>,
        queue: Arc<PendingRedemptionQueue>,
        rpc_primary: String,
        rpc_fallbacks: Vec<String>,
        wallet: LocalWallet,
        chain_id: u64,
        known_proxy_wallet: Option<Address>,
    ) -> Self {
        Self {
            bus,
            queue,
            proxy_resolver: ProxyWalletResolver::new(known_proxy_wallet),
            is_checking: AtomicBool::new(false),
            rpc_primary,
            rpc_fallbacks,
            wallet,
            chain_id,
        }
    }

    /// Runs once per scan tick. Re-entrant invocations short-circuit
    /// immediately (§4.I latch).
    pub async fn check_and_redeem(&self) {
        if self.is_checking.swap(true, Ordering::AcqRel) {
            return;
        }
        self.run_once().await;
        self.is_checking.store(false, Ordering::Release);
    }

    async fn run_once(&self) {
        let now = chrono::Utc::now().timestamp();
        let candidates = self.queue.candidates(now);
        if candidates.is_empty() {
            return;
        }

        let provider = chain::connect_provider(&self.rpc_primary, &self.rpc_fallbacks).await;
        let client = chain::build_client(provider, self.wallet.clone(), self.chain_id);
        let signer = self.wallet.address();
        let proxy = self.proxy_resolver.resolve(&client, signer).await;

        let neg_risk_adapter: Address = NEG_RISK_ADAPTER_ADDRESS.parse().expect("static address");
        let neg_risk = NegRiskAdapterContract::new(neg_risk_adapter, client.clone());
        let wrapped_collateral: Option<Address> = neg_risk.wcol().call().await.ok();

        for candidate in candidates {
            self.process_one(&client, signer, proxy, wrapped_collateral, candidate).await;
        }

        self.queue.sweep_terminal();
    }

    async fn process_one(
        &self,
        client: &Arc<ChainClient>,
        signer: Address,
        proxy: Option<Address>,
        wrapped_collateral: Option<Address>,
        candidate: PendingRedemption,
    ) {
        let key = candidate.key().to_string();

        let Some(condition_id) = chain::parse_condition_id(&candidate.condition_id) else {
            self.queue.transition(&key, |e| {
                e.status = RedemptionStatus::Error;
                e.error = Some("unparseable conditionId".to_string());
            });
            self.bus.append_activity("redemption_error", format!("{key} invalid conditionId"));
            return;
        };

        let ctf_address: Address = CTF_ADDRESS.parse().expect("static address");
        let ctf = ConditionalTokensContract::new(ctf_address, client.clone());

        let payout_denominator = match ctf.payout_denominator(condition_id).call().await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(condition_id = %key, error = %e, "payoutDenominator RPC error, retrying next tick");
                return; // transient; leave waiting
            }
        };
        if payout_denominator.is_zero() {
            return; // market not yet resolved on-chain; leave waiting
        }

        let Some(token_id_str) = candidate.token_id.as_deref() else {
            self.queue.transition(&key, |e| {
                e.status = RedemptionStatus::Error;
                e.error = Some("missing tokenId, cannot check balance".to_string());
            });
            return;
        };
        let Ok(token_id) = U256::from_dec_str(token_id_str) else {
            self.queue.transition(&key, |e| {
                e.status = RedemptionStatus::Error;
                e.error = Some("unparseable tokenId".to_string());
            });
            return;
        };

        let wallet_to_check = proxy.unwrap_or(signer);
        let balance = match ctf.balance_of(wallet_to_check, token_id).call().await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(condition_id = %key, error = %e, "balanceOf RPC error, retrying next tick");
                return;
            }
        };
        if balance.is_zero() {
            self.queue.transition(&key, |e| e.status = RedemptionStatus::NoPayout);
            self.bus.append_activity("redemption_no_payout", format!("{key} balance is zero, lost"));
            return;
        }

        self.queue.transition(&key, |e| e.status = RedemptionStatus::Redeeming);

        let mut last_error: Option<String> = None;
        let mut ladder = Vec::new();
        if candidate.neg_risk {
            if let Some(wcol) = wrapped_collateral {
                ladder.push((Rung::NegRisk, wcol));
            }
        }
        let usdc: Address = USDC_ADDRESS.parse().expect("static address");
        ladder.push((Rung::Plain, usdc));

        for (rung, collateral) in ladder {
            match self.attempt_redeem(client, proxy, rung, collateral, condition_id).await {
                Ok(tx_hash) => {
                    self.queue.transition(&key, |e| {
                        e.status = RedemptionStatus::Redeemed;
                        e.tx_hash = Some(format!("{tx_hash:#x}"));
                        e.redeemed_at = Some(chrono::Utc::now().timestamp());
                    });
                    self.bus.append_activity("redemption_success", format!("{key} redeemed via {} tx={tx_hash:#x}", rung.label()));
                    return;
                }
                Err(e) => {
                    tracing::warn!(condition_id = %key, rung = rung.label(), error = %e, "redemption attempt failed, continuing ladder");
                    last_error = Some(e.to_string());
                }
            }
        }

        let reason = last_error.unwrap_or_else(|| "all ladder attempts exhausted".to_string());
        let lowered = reason.to_lowercase();
        let status = if lowered.contains("payout is zero") || lowered.contains("result is empty") {
            RedemptionStatus::NoPayout
        } else {
            RedemptionStatus::Error
        };
        self.queue.transition(&key, |e| {
            e.status = status;
            e.error = Some(reason.clone());
        });
        self.bus.append_activity("redemption_failed", format!("{key} {reason}"));
    }

    async fn attempt_redeem(
        &self,
        client: &Arc<ChainClient>,
        proxy: Option<Address>,
        rung: Rung,
        collateral: Address,
        condition_id: [u8; 32],
    ) -> anyhow::Result<H256> {
        let data = chain::encode_redeem_call(collateral, condition_id);
        let to: Address = rung.target_address().parse().expect("static address");

        match proxy {
            Some(proxy_addr) => self.attempt_via_proxy(client, proxy_addr, to, data).await,
            None => self.attempt_direct(client, rung, collateral, condition_id).await,
        }
    }

    async fn attempt_direct(
        &self,
        client: &Arc<ChainClient>,
        rung: Rung,
        collateral: Address,
        condition_id: [u8; 32],
    ) -> anyhow::Result<H256> {
        let index_sets = vec![U256::from(1u64), U256::from(2u64)];
        let parent_collection_id = [0u8; 32];

        let receipt = match rung {
            Rung::NegRisk => {
                let to: Address = NEG_RISK_ADAPTER_ADDRESS.parse()?;
                let contract = NegRiskAdapterContract::new(to, client.clone());
                contract
                    .redeem_positions(collateral, parent_collection_id, condition_id, index_sets)
                    .gas(500_000)
                    .send()
                    .await?
                    .await?
            }
            Rung::Plain => {
                let to: Address = CTF_ADDRESS.parse()?;
                let contract = ConditionalTokensContract::new(to, client.clone());
                contract
                    .redeem_positions(collateral, parent_collection_id, condition_id, index_sets)
                    .gas(500_000)
                    .send()
                    .await?
                    .await?
            }
        };

        let receipt = receipt.ok_or_else(|| anyhow::anyhow!("transaction dropped before inclusion"))?;
        if receipt.status == Some(U64::one()) {
            Ok(receipt.transaction_hash)
        } else {
            anyhow::bail!("transaction reverted (status=0)")
        }
    }

    async fn attempt_via_proxy(
        &self,
        client: &Arc<ChainClient>,
        proxy_addr: Address,
        to: Address,
        data: Bytes,
    ) -> anyhow::Result<H256> {
        let safe = SafeProxyContract::new(proxy_addr, client.clone());
        let safe_nonce: U256 = safe.nonce().call().await?;
        let safe_tx_hash: [u8; 32] = safe
            .get_transaction_hash(to, U256::zero(), data.clone(), 0u8, U256::zero(), U256::zero(), U256::zero(), Address::zero(), Address::zero(), safe_nonce)
            .call()
            .await?;

        let signature = chain::sign_safe_tx_hash(&self.wallet, safe_tx_hash)?;
        let gas_price = client.get_gas_price().await? * 2u64;

        let pending = safe
            .exec_transaction(to, U256::zero(), data, 0u8, U256::zero(), U256::zero(), gas_price, Address::zero(), Address::zero(), signature)
            .gas(500_000)
            .send()
            .await?;
        let receipt = pending.await?.ok_or_else(|| anyhow::anyhow!("transaction dropped before inclusion"))?;

        self.verify_proxy_receipt(&receipt, proxy_addr)?;
        Ok(receipt.transaction_hash)
    }

    /// Verifies a proxied redemption via log inspection rather than
    /// `receipt.status` alone, since the outer transaction can succeed
    /// while the inner Safe call reverts (§4.I step 6e, §7 "Internal Safe
    /// failure").
    fn verify_proxy_receipt(&self, receipt: &TransactionReceipt, proxy_addr: Address) -> anyhow::Result<()> {
        let success_topic = chain::ExecutionSuccessFilter::signature();
        let failure_topic = chain::ExecutionFailureFilter::signature();

        let mut saw_success = false;
        let mut saw_failure = false;
        for log in &receipt.logs {
            if log.address != proxy_addr {
                continue;
            }
            let Some(topic0) = log.topics.first() else { continue };
            if *topic0 == success_topic {
                saw_success = true;
            } else if *topic0 == failure_topic {
                saw_failure = true;
            }
        }

        if saw_failure {
            anyhow::bail!("ExecutionFailure: inner Safe call reverted");
        }
        if saw_success {
            return Ok(());
        }
        anyhow::bail!("neither ExecutionSuccess nor ExecutionFailure log found")
    }
}

/// Resolves `WALLET_PRIVATE_KEY` into a signer. Kept separate from
/// `RedemptionEngine::new` so callers can fail fast at startup rather than
/// on the first tick.
pub fn wallet_from_private_key(private_key: &str) -> anyhow::Result<LocalWallet> {
    LocalWallet::from_str(private_key.trim_start_matches("0x")).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rung_targets_distinct_contracts() {
        assert_ne!(Rung::NegRisk.target_address(), Rung::Plain.target_address());
    }

    fn test_engine() -> RedemptionEngine {
        let bus = Arc::new(ActivityBus::new());
        let queue = Arc::new(PendingRedemptionQueue::new());
        let wallet = wallet_from_private_key("1111111111111111111111111111111111111111111111111111111111111111").unwrap();
        RedemptionEngine::new(bus, queue, "https://example.invalid".into(), Vec::new(), wallet, 137, None)
    }

    fn log_with_topic(address: Address, topic0: H256) -> ethers::types::Log {
        ethers::types::Log { address, topics: vec![topic0], ..Default::default() }
    }

    /// S4: `ExecutionSuccess` alone (no separate stablecoin Transfer check
    /// performed here — the step 6e "acceptable" path) verifies.
    #[test]
    fn verify_proxy_receipt_accepts_execution_success() {
        let engine = test_engine();
        let proxy: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let receipt = TransactionReceipt {
            logs: vec![log_with_topic(proxy, chain::ExecutionSuccessFilter::signature())],
            ..Default::default()
        };
        assert!(engine.verify_proxy_receipt(&receipt, proxy).is_ok());
    }

    /// S5: `ExecutionFailure` present means the inner Safe call reverted
    /// even though the outer transaction was mined; the ladder must treat
    /// this attempt as failed and move to the next rung.
    #[test]
    fn verify_proxy_receipt_rejects_execution_failure() {
        let engine = test_engine();
        let proxy: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let receipt = TransactionReceipt {
            logs: vec![log_with_topic(proxy, chain::ExecutionFailureFilter::signature())],
            ..Default::default()
        };
        assert!(engine.verify_proxy_receipt(&receipt, proxy).is_err());
    }

    /// Logs from an unrelated contract address must not count, even if
    /// their topic0 happens to match `ExecutionSuccess`.
    #[test]
    fn verify_proxy_receipt_ignores_logs_from_other_addresses() {
        let engine = test_engine();
        let proxy: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let other: Address = "0x00000000000000000000000000000000000001".parse().unwrap();
        let receipt = TransactionReceipt {
            logs: vec![log_with_topic(other, chain::ExecutionSuccessFilter::signature())],
            ..Default::default()
        };
        assert!(engine.verify_proxy_receipt(&receipt, proxy).is_err());
    }

    /// §8 invariant 6: the ladder exits at the first verified success — a
    /// receipt carrying both topics (pathological, but logs are unordered
    /// per spec's step 6e wording) must still be treated as failure since
    /// `ExecutionFailure` presence is checked first.
    #[test]
    fn verify_proxy_receipt_failure_takes_precedence_over_success() {
        let engine = test_engine();
        let proxy: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let receipt = TransactionReceipt {
            logs: vec![
                log_with_topic(proxy, chain::ExecutionSuccessFilter::signature()),
                log_with_topic(proxy, chain::ExecutionFailureFilter::signature()),
            ],
            ..Default::default()
        };
        assert!(engine.verify_proxy_receipt(&receipt, proxy).is_err());
    }
}
