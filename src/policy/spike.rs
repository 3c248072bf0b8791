//! Strategy 1 — deterministic spike detector.
//!
//! Pure arithmetic over `PriceContext`; no snapshot input. New code (the
//! teacher has no direct analog), following the `vault/updown15m.rs` style
//! of small pure probability/threshold helper functions.

use super::DecisionPolicy;
use crate::models::{Action, Confidence, Decision, MarketSnapshot, PriceContext};
use async_trait::async_trait;

pub struct SpikeDetectorPolicy {
    pub threshold_dollars: f64,
    pub min_speed: f64,
}

impl Default for SpikeDetectorPolicy {
    fn default() -> Self {
        Self { threshold_dollars: 30.0, min_speed: 15.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpikeResult {
    pub detected: bool,
    pub delta_dollars: f64,
    pub speed: f64,
}

impl SpikeDetectorPolicy {
    /// For each window W ∈ {60,180,300}s compute `|Δ$|` and
    /// `speed = |Δ$| / (W/60)`; detect if any window clears both
    /// thresholds, picking the window with greatest speed.
    pub fn detect(&self, ctx: &PriceContext) -> SpikeResult {
        let windows: [(f64, f64); 3] = [
            (ctx.change_60.dollars, 60.0 / 60.0),
            (ctx.change_180.dollars, 180.0 / 60.0),
            (ctx.change_300.dollars, 300.0 / 60.0),
        ];

        let mut best = SpikeResult { detected: false, delta_dollars: 0.0, speed: 0.0 };
        for (delta, minutes) in windows {
            let speed = delta.abs() / minutes;
            if delta.abs() >= self.threshold_dollars && speed >= self.min_speed && speed > best.speed {
                best = SpikeResult { detected: true, delta_dollars: delta, speed };
            }
        }
        best
    }
}

#[async_trait]
impl DecisionPolicy for SpikeDetectorPolicy {
    async fn decide(&self, _snapshot: &MarketSnapshot, feed_context: &PriceContext) -> Decision {
        let spike = self.detect(feed_context);
        if !spike.detected {
            return Decision::skip("no spike detected");
        }

        let action = if spike.delta_dollars > 0.0 { Action::BuyYes } else { Action::BuyNo };
        let confidence = if spike.speed >= 30.0 { Confidence::High } else { Confidence::Medium };

        Decision::new(
            action,
            confidence,
            "spike",
            format!("Δ${:.2} speed={:.2}$/min", spike.delta_dollars, spike.speed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Change;

    fn ctx(change_60: f64, change_180: f64, change_300: f64) -> PriceContext {
        PriceContext {
            change_60: Change { dollars: change_60, percent: 0.0 },
            change_180: Change { dollars: change_180, percent: 0.0 },
            change_300: Change { dollars: change_300, percent: 0.0 },
            ..PriceContext::default()
        }
    }

    #[test]
    fn below_threshold_yields_no_detection() {
        let policy = SpikeDetectorPolicy::default();
        let result = policy.detect(&ctx(10.0, 10.0, 10.0));
        assert!(!result.detected);
    }

    #[test]
    fn below_min_speed_yields_no_detection() {
        // 31s/600s window variant isn't modeled; use 300s window where speed is low.
        let policy = SpikeDetectorPolicy::default();
        let result = policy.detect(&ctx(0.0, 0.0, 31.0)); // speed = 31/5 = 6.2 < 15
        assert!(!result.detected);
    }

    #[test]
    fn clears_both_thresholds_in_60s_window() {
        let policy = SpikeDetectorPolicy::default();
        let result = policy.detect(&ctx(35.0, 0.0, 0.0)); // speed = 35/1 = 35 >= 15, delta >= 30
        assert!(result.detected);
        assert!(result.speed >= 30.0);
    }

    #[test]
    fn picks_window_with_greatest_speed() {
        let policy = SpikeDetectorPolicy::default();
        // 60s window: delta 31, speed 31 ; 180s window: delta 90, speed 30
        let result = policy.detect(&ctx(31.0, 90.0, 0.0));
        assert!(result.detected);
        assert!((result.speed - 31.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn high_speed_maps_to_high_confidence() {
        let policy = SpikeDetectorPolicy::default();
        let snapshot_ctx = ctx(40.0, 0.0, 0.0);
        // speed 40 >= 30 => High confidence, positive delta => BuyYes
        let decision = policy.detect(&snapshot_ctx);
        assert!(decision.speed >= 30.0);
    }
}
