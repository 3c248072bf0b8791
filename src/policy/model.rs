//! Strategy 2 — model-scored policy.
//!
//! Builds a structured textual prompt from snapshot + feed context, calls
//! an external scoring service, and normalizes its response. Grounded on
//! `vault/llm.rs`'s prompt-building-then-call-then-parse-with-SKIP-fallback
//! shape; the exact prompt wording is out of scope per spec.md §1.

use super::DecisionPolicy;
use crate::models::{Action, Confidence, Decision, MarketSnapshot, PriceContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub struct ModelScoredPolicy {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl ModelScoredPolicy {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), endpoint: endpoint.into() }
    }

    fn build_prompt(&self, snapshot: &MarketSnapshot, ctx: &PriceContext) -> String {
        format!(
            "Market: {}\nEnds in {:.1} minutes.\nYes mid: {:?} No mid: {:?}\n\
             Reference price direction={:?} momentum={:?}\n\
             Minute-by-minute changes: 1m={:.3}% 3m={:.3}% 5m={:.3}% 10m={:.3}%\n\
             Recent price history points: {}\n\
             Respond with a JSON object: {{\"action\":\"BUY_YES|BUY_NO|SKIP\",\"confidence\":\"LOW|MEDIUM|HIGH\",\"pattern\":\"...\",\"reasoning\":\"...\"}}",
            snapshot.market.question,
            snapshot.market.minutes_left(chrono::Utc::now().timestamp()),
            snapshot.yes_token.price.mid,
            snapshot.no_token.price.mid,
            ctx.direction,
            ctx.momentum,
            ctx.change_60.percent,
            ctx.change_180.percent,
            ctx.change_300.percent,
            ctx.change_600.percent,
            snapshot.price_history.len(),
        )
    }

    fn normalize(raw: Option<RawScore>) -> Decision {
        let Some(raw) = raw else { return Decision::skip("empty content") };

        let action = match raw.action.as_deref() {
            Some("BUY_YES") => Action::BuyYes,
            Some("BUY_NO") => Action::BuyNo,
            _ => Action::Skip, // unknown actions normalize to SKIP
        };
        let confidence = match raw.confidence.as_deref() {
            Some("HIGH") => Confidence::High,
            Some("MEDIUM") => Confidence::Medium,
            _ => Confidence::Low, // unknown confidences normalize to LOW
        };

        Decision::new(
            action,
            confidence,
            raw.pattern.unwrap_or_else(|| "model".to_string()),
            raw.reasoning.unwrap_or_default(),
        )
    }
}

#[async_trait]
impl DecisionPolicy for ModelScoredPolicy {
    async fn decide(&self, snapshot: &MarketSnapshot, feed_context: &PriceContext) -> Decision {
        let prompt = self.build_prompt(snapshot, feed_context);

        let resp = match self
            .http
            .post(&self.endpoint)
            .timeout(Duration::from_secs(15))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return Decision::skip("scoring service http error"), // all failure modes yield SKIP
        };

        let raw: Option<RawScore> = resp.json().await.ok();
        Self::normalize(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_normalizes_to_skip() {
        let raw = RawScore { action: Some("HODL".into()), confidence: Some("HIGH".into()), pattern: None, reasoning: None };
        let d = ModelScoredPolicy::normalize(Some(raw));
        assert_eq!(d.action, Action::Skip);
    }

    #[test]
    fn unknown_confidence_normalizes_to_low_and_skip() {
        let raw = RawScore { action: Some("BUY_YES".into()), confidence: Some("SUPER".into()), pattern: None, reasoning: None };
        let d = ModelScoredPolicy::normalize(Some(raw));
        assert_eq!(d.confidence, Confidence::Low);
        assert_eq!(d.action, Action::Skip);
    }

    #[test]
    fn empty_content_yields_skip() {
        let d = ModelScoredPolicy::normalize(None);
        assert_eq!(d.action, Action::Skip);
    }

    #[test]
    fn well_formed_high_confidence_buy_yes_passes_through() {
        let raw = RawScore { action: Some("BUY_YES".into()), confidence: Some("HIGH".into()), pattern: Some("breakout".into()), reasoning: Some("r".into()) };
        let d = ModelScoredPolicy::normalize(Some(raw));
        assert_eq!(d.action, Action::BuyYes);
        assert_eq!(d.confidence, Confidence::High);
    }
}
