//! Decision Policy (§4.F).
//!
//! A polymorphic capability: `decide(snapshot, feedContext) → Decision`.
//! The trait shape is grounded on `vault/execution.rs`'s
//! `#[async_trait] trait ExecutionAdapter` (one async method, `Send + Sync`
//! bound, implementors are values not classes — see §9's "policy swap"
//! design note). Both packaged strategies are pure with respect to
//! mutable state outside the policy; they may log advisory events only.

pub mod model;
pub mod spike;

use crate::models::{Decision, MarketSnapshot, PriceContext};
use async_trait::async_trait;

#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    async fn decide(&self, snapshot: &MarketSnapshot, feed_context: &PriceContext) -> Decision;
}

pub use model::ModelScoredPolicy;
pub use spike::{SpikeDetectorPolicy, SpikeResult};
