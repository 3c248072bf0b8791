//! Activity Bus & Ring Buffers (§4.A).
//!
//! Three bounded, newest-first, append-only sequences. Single-writer
//! preferred; readers take a short lock and clone a snapshot, matching the
//! teacher's `parking_lot::RwLock<VecDeque<_>>` convention for bounded
//! histories (`vault/fast15m_reactive.rs`'s `recent_spans`).

use crate::models::{Decision, TradeRecord, TradeResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_RING: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub timestamp: i64,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionEntry {
    pub id: u64,
    pub timestamp: i64,
    pub decision: Decision,
}

struct Ring<T> {
    items: RwLock<VecDeque<T>>,
    cap: usize,
}

impl<T: Clone> Ring<T> {
    fn new(cap: usize) -> Self {
        Self { items: RwLock::new(VecDeque::with_capacity(cap)), cap }
    }

    fn push_front(&self, item: T) {
        let mut g = self.items.write();
        g.push_front(item);
        while g.len() > self.cap {
            g.pop_back();
        }
    }

    fn list(&self, limit: usize) -> Vec<T> {
        let g = self.items.read();
        g.iter().take(limit).cloned().collect()
    }
}

pub struct ActivityBus {
    next_id: AtomicU64,
    activities: Ring<ActivityEntry>,
    decisions: Ring<DecisionEntry>,
    trades: Ring<TradeRecord>,
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            activities: Ring::new(MAX_RING),
            decisions: Ring::new(MAX_RING),
            trades: Ring::new(MAX_RING),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn append_activity(&self, category: impl Into<String>, message: impl Into<String>) -> ActivityEntry {
        let entry = ActivityEntry {
            id: self.next_id(),
            timestamp: chrono::Utc::now().timestamp(),
            category: category.into(),
            message: message.into(),
        };
        self.activities.push_front(entry.clone());
        tracing::info!(category = %entry.category, message = %entry.message, "activity");
        entry
    }

    pub fn append_decision(&self, decision: Decision) -> DecisionEntry {
        let entry = DecisionEntry {
            id: self.next_id(),
            timestamp: chrono::Utc::now().timestamp(),
            decision,
        };
        self.decisions.push_front(entry.clone());
        entry
    }

    pub fn append_trade(&self, mut trade: TradeRecord) -> TradeRecord {
        trade.id = self.next_id();
        trade.timestamp = chrono::Utc::now().timestamp();
        self.trades.push_front(trade.clone());
        trade
    }

    /// Mutates a trade in place by id; used only for result reconciliation.
    pub fn update_trade(&self, id: u64, result: TradeResult, order_id: Option<String>) {
        let mut g = self.trades.items.write();
        if let Some(t) = g.iter_mut().find(|t| t.id == id) {
            t.result = result;
            if order_id.is_some() {
                t.order_id = order_id;
            }
        }
    }

    pub fn list_activities(&self, limit: usize) -> Vec<ActivityEntry> {
        self.activities.list(limit)
    }

    pub fn list_decisions(&self, limit: usize) -> Vec<DecisionEntry> {
        self.decisions.list(limit)
    }

    pub fn list_trades(&self, limit: usize) -> Vec<TradeRecord> {
        self.trades.list(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_bounded_and_newest_first() {
        let bus = ActivityBus::new();
        for i in 0..(MAX_RING + 10) {
            bus.append_activity("test", format!("entry {i}"));
        }
        let all = bus.list_activities(MAX_RING + 10);
        assert_eq!(all.len(), MAX_RING);
        assert!(all[0].message.contains(&(MAX_RING + 9).to_string()));
    }

    #[test]
    fn list_respects_limit() {
        let bus = ActivityBus::new();
        for i in 0..5 {
            bus.append_activity("test", format!("{i}"));
        }
        assert_eq!(bus.list_activities(2).len(), 2);
    }
}
