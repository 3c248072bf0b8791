//! Market Discovery (§4.D).
//!
//! Resolves the currently-live 15-minute window to at most one market
//! record. Slug format and events-index query style are grounded on
//! `vault/updown15m.rs` (`"{asset}-updown-15m-{unix_ts}"`) and
//! `scrapers/polymarket_gamma.rs` (`gamma_market_lookup`'s flexible
//! string-or-number deserializers), generalized from "look up one known
//! slug" to "enumerate candidate slugs and filter survivors."

use crate::models::{MarketRecord, MarketToken, Outcome};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

const SLOT_SECONDS: i64 = 15 * 60;
const CANDIDATE_OFFSETS: [i64; 5] = [-2, -1, 0, 1, 2];
const DEFAULT_MIN_MINUTES_LEFT: f64 = 3.0;
const DEFAULT_MAX_MINUTES_LEFT: f64 = 12.0;
const SPIKE_MIN_MINUTES_LEFT: f64 = 1.0;
const SPIKE_MAX_MINUTES_LEFT: f64 = 14.0;

#[derive(Debug, Deserialize)]
struct EventLookup {
    #[serde(rename = "conditionId")]
    condition_id: Option<String>,
    question: Option<String>,
    #[serde(rename = "endDateIso", alias = "end_date_iso")]
    end_date_iso: Option<String>,
    active: Option<bool>,
    closed: Option<bool>,
    #[serde(default, deserialize_with = "de_string_vec")]
    outcomes: Vec<String>,
    #[serde(rename = "clobTokenIds", default, deserialize_with = "de_string_vec")]
    clob_token_ids: Vec<String>,
    #[serde(rename = "negRisk", default)]
    neg_risk: bool,
    #[serde(rename = "tickSize", default, deserialize_with = "de_string_f64_opt")]
    tick_size: Option<f64>,
}

fn de_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Array(arr) => Ok(arr.into_iter().filter_map(|x| x.as_str().map(str::to_string)).collect()),
        Value::String(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
        _ => Ok(Vec::new()),
    }
}

fn de_string_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if !s.is_empty() => s.parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

pub struct MarketDiscovery {
    http: reqwest::Client,
    events_index_url: String,
}

impl MarketDiscovery {
    pub fn new(http: reqwest::Client, events_index_url: String) -> Self {
        Self { http, events_index_url }
    }

    /// `scanMarkets() → [marketRecord]`. Returns zero or one record.
    /// Per-candidate HTTP errors are silently skipped; an empty result is
    /// a normal outcome.
    pub async fn scan_markets(&self, asset: &str, now: i64, spike_mode: bool) -> Vec<MarketRecord> {
        let current_slot = now - (now.rem_euclid(SLOT_SECONDS));
        let mut survivors = Vec::new();

        for offset in CANDIDATE_OFFSETS {
            let start_ts = current_slot + offset * SLOT_SECONDS;
            let end_ts = start_ts + SLOT_SECONDS;
            if end_ts <= now {
                continue;
            }
            let slug = format!("{asset}-updown-15m-{start_ts}");

            let Some(record) = self.lookup_slug(&slug, asset, end_ts, now).await else { continue };
            survivors.push(record);
        }

        let (min_left, max_left) = if spike_mode {
            (SPIKE_MIN_MINUTES_LEFT, SPIKE_MAX_MINUTES_LEFT)
        } else {
            (DEFAULT_MIN_MINUTES_LEFT, DEFAULT_MAX_MINUTES_LEFT)
        };

        survivors.retain(|m: &MarketRecord| {
            let left = m.minutes_left(now);
            left > 1.0 && left >= min_left && left <= max_left
        });

        // Among survivors, retain one per asset preferring smallest minutesLeft.
        survivors.sort_by(|a, b| a.minutes_left(now).partial_cmp(&b.minutes_left(now)).unwrap());
        survivors.into_iter().take(1).collect()
    }

    async fn lookup_slug(&self, slug: &str, asset: &str, end_ts: i64, now: i64) -> Option<MarketRecord> {
        let resp = self
            .http
            .get(&self.events_index_url)
            .timeout(Duration::from_secs(10))
            .query(&[("slug", slug), ("limit", "1")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let events: Vec<EventLookup> = resp.json().await.ok()?;
        let ev = events.into_iter().next()?;

        if ev.active != Some(true) || ev.closed == Some(true) {
            return None;
        }
        if ev.clob_token_ids.len() < 2 {
            return None;
        }
        let condition_id = ev.condition_id?;
        let end_time = end_ts.max(now + 1);

        let outcomes: Vec<String> = if ev.outcomes.len() >= 2 {
            ev.outcomes
        } else {
            vec!["Up".to_string(), "Down".to_string()]
        };

        let mut tokens = Vec::with_capacity(2);
        for (idx, outcome_label) in outcomes.iter().take(2).enumerate() {
            let outcome = if outcome_label.eq_ignore_ascii_case("up") { Outcome::Up } else { Outcome::Down };
            tokens.push(MarketToken { token_id: ev.clob_token_ids.get(idx)?.clone(), outcome });
        }
        let tokens: [MarketToken; 2] = tokens.try_into().ok()?;

        Some(MarketRecord {
            condition_id,
            question: ev.question.unwrap_or_default(),
            end_time,
            tokens,
            neg_risk: ev.neg_risk,
            tick_size: ev.tick_size.unwrap_or(0.01),
            asset: asset.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_minutes_left_three_accepted_two_rejected() {
        let now = 0i64;
        let accepted = MarketRecord {
            condition_id: "0x1".into(),
            question: "q".into(),
            end_time: 3 * 60,
            tokens: [
                MarketToken { token_id: "1".into(), outcome: Outcome::Up },
                MarketToken { token_id: "2".into(), outcome: Outcome::Down },
            ],
            neg_risk: false,
            tick_size: 0.01,
            asset: "btc".into(),
        };
        assert!((accepted.minutes_left(now) - 3.0).abs() < 1e-9);
        assert!(accepted.minutes_left(now) >= DEFAULT_MIN_MINUTES_LEFT);

        let mut rejected = accepted;
        rejected.end_time = 2 * 60;
        assert!(rejected.minutes_left(now) < DEFAULT_MIN_MINUTES_LEFT);
    }
}
