//! Proxy-wallet discovery (§4.I "Proxy-wallet discovery").
//!
//! Computes the deterministic proxy address via the factory, verifies the
//! signer co-owns it with a 1-of-N threshold, falls back to a statically
//! configured known-good address, and caches the verified result for the
//! process lifetime — independent of which `ChainClient` instance performs
//! the lookup, since the engine rebuilds its RPC client every tick (§4.I
//! step 1) but the proxy address itself never changes. New code — the
//! teacher has no Safe/proxy-wallet concept; grounded on the same on-chain
//! idiom as `chain.rs`.

use crate::redemption::chain::{ChainClient, ProxyFactoryContract, SafeProxyContract, PROXY_FACTORY_ADDRESS};
use ethers::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct ProxyWalletResolver {
    known_proxy_wallet: Option<Address>,
    /// Cached for the process lifetime once verified.
    cached: Mutex<Option<Address>>,
}

/// Outcome of computing the deterministic proxy address and checking it.
/// Kept distinct from a plain `Option` because the two failure modes have
/// different spec-mandated fallback behavior (§4.I "Proxy-wallet discovery").
enum ComputedProxy {
    /// No code deployed at the computed address — the operator's static
    /// `KNOWN_PROXY_WALLET` fallback is allowed here.
    NoCode,
    /// Code is deployed but the signer isn't a co-owner, or the threshold
    /// isn't 1 — spec says "return null (cannot co-sign)", no fallback.
    VerificationFailed,
    Verified(Address),
}

impl ProxyWalletResolver {
    pub fn new(known_proxy_wallet: Option<Address>) -> Self {
        Self { known_proxy_wallet, cached: Mutex::new(None) }
    }

    pub async fn resolve(&self, client: &Arc<ChainClient>, signer: Address) -> Option<Address> {
        if let Some(cached) = *self.cached.lock() {
            return Some(cached);
        }

        match self.compute_and_verify(client, signer).await {
            ComputedProxy::Verified(verified) => {
                *self.cached.lock() = Some(verified);
                Some(verified)
            }
            ComputedProxy::VerificationFailed => None,
            ComputedProxy::NoCode => {
                if let Some(known) = self.known_proxy_wallet {
                    if Self::has_code(client, known).await {
                        *self.cached.lock() = Some(known);
                        return Some(known);
                    }
                }
                None
            }
        }
    }

    async fn has_code(client: &Arc<ChainClient>, address: Address) -> bool {
        matches!(client.get_code(address, None).await, Ok(code) if !code.is_empty())
    }

    async fn compute_and_verify(&self, client: &Arc<ChainClient>, signer: Address) -> ComputedProxy {
        let Some(factory_address) = PROXY_FACTORY_ADDRESS.parse::<Address>().ok() else {
            return ComputedProxy::NoCode;
        };
        let factory = ProxyFactoryContract::new(factory_address, client.clone());
        let Ok(computed) = factory.compute_proxy_address(signer).call().await else {
            return ComputedProxy::NoCode;
        };

        if !Self::has_code(client, computed).await {
            return ComputedProxy::NoCode;
        }

        let safe = SafeProxyContract::new(computed, client.clone());
        let (owners_res, threshold_res) = tokio::join!(safe.get_owners().call(), safe.get_threshold().call());
        // RPC failure reading owners/threshold on a deployed contract is not
        // "no code" — it's an inability to verify co-signing.
        let Ok(owners) = owners_res else { return ComputedProxy::VerificationFailed };
        let Ok(threshold) = threshold_res else { return ComputedProxy::VerificationFailed };

        // "Verify the signer is an owner and the proxy threshold = 1; if
        // not, return null (cannot co-sign)."
        if threshold != U256::one() || !owners.contains(&signer) {
            return ComputedProxy::VerificationFailed;
        }

        ComputedProxy::Verified(computed)
    }
}
