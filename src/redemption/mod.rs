//! Pending-Redemption Queue (§4.H) and Redemption Engine (§4.I).

pub mod chain;
pub mod engine;
pub mod proxy;
pub mod queue;

pub use engine::{wallet_from_private_key, RedemptionEngine};
pub use queue::PendingRedemptionQueue;
