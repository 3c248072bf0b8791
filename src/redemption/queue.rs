//! Pending-Redemption Queue (§4.H).
//!
//! An append-only sequence, deduplicated by `PendingRedemption::key()`,
//! with terminal entries moved into a bounded history ring of 20. Grounded
//! on `other_examples/…monodexr-polymarket-arb…redemption.rs`'s
//! `Redeemer { pending: HashMap<String, PendingPosition> }` dedup-by-key
//! shape, generalized to the spec's waiting/history split and richer
//! status machine (the monodexr file only has "pending" vs "removed").

use crate::models::{PendingRedemption, RedemptionStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;

const HISTORY_CAP: usize = 20;

pub struct PendingRedemptionQueue {
    pending: Mutex<Vec<PendingRedemption>>,
    history: Mutex<VecDeque<PendingRedemption>>,
}

impl Default for PendingRedemptionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRedemptionQueue {
    pub fn new() -> Self {
        Self { pending: Mutex::new(Vec::new()), history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)) }
    }

    /// No-op if a matching key already exists in pending. Idempotent.
    pub fn append(&self, entry: PendingRedemption) {
        let mut pending = self.pending.lock();
        if pending.iter().any(|p| p.key() == entry.key()) {
            return;
        }
        pending.push(entry);
    }

    /// Entries with `status == waiting` and `now ≥ marketEndTime + 2 min`
    /// (§4.I step 5).
    pub fn candidates(&self, now: i64) -> Vec<PendingRedemption> {
        const GRACE_SECS: i64 = 2 * 60;
        self.pending
            .lock()
            .iter()
            .filter(|p| p.status == RedemptionStatus::Waiting && now >= p.market_end_time + GRACE_SECS)
            .cloned()
            .collect()
    }

    /// Apply an in-place status transition by key. Returns `false` if no
    /// matching entry exists.
    pub fn transition(&self, key: &str, f: impl FnOnce(&mut PendingRedemption)) -> bool {
        let mut pending = self.pending.lock();
        match pending.iter_mut().find(|p| p.key() == key) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    /// Removes terminal entries from the pending list, pushing each into
    /// the bounded history ring (§4.I step 7, §4.H history-of-20).
    pub fn sweep_terminal(&self) {
        let mut pending = self.pending.lock();
        let (terminal, waiting): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.status != RedemptionStatus::Waiting && p.status != RedemptionStatus::Redeeming);
        *pending = waiting;
        drop(pending);

        if terminal.is_empty() {
            return;
        }
        let mut history = self.history.lock();
        for entry in terminal {
            history.push_front(entry);
            while history.len() > HISTORY_CAP {
                history.pop_back();
            }
        }
    }

    pub fn list_pending(&self) -> Vec<PendingRedemption> {
        self.pending.lock().clone()
    }

    pub fn list_history(&self) -> Vec<PendingRedemption> {
        self.history.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(condition_id: &str, end_time: i64, status: RedemptionStatus) -> PendingRedemption {
        PendingRedemption {
            condition_id: condition_id.to_string(),
            token_id: None,
            neg_risk: false,
            market_end_time: end_time,
            added_at: 0,
            status,
            tx_hash: None,
            redeemed_at: None,
            error: None,
        }
    }

    #[test]
    fn append_is_idempotent_by_key() {
        let q = PendingRedemptionQueue::new();
        q.append(entry("0xabc", 0, RedemptionStatus::Waiting));
        q.append(entry("0xabc", 0, RedemptionStatus::Waiting));
        assert_eq!(q.list_pending().len(), 1);
    }

    #[test]
    fn candidates_respect_two_minute_grace() {
        let q = PendingRedemptionQueue::new();
        q.append(entry("0xabc", 0, RedemptionStatus::Waiting));
        assert!(q.candidates(60).is_empty());
        assert!(!q.candidates(121).is_empty());
    }

    #[test]
    fn sweep_moves_terminal_entries_to_history() {
        let q = PendingRedemptionQueue::new();
        q.append(entry("0xabc", 0, RedemptionStatus::Waiting));
        q.transition("0xabc", |e| e.status = RedemptionStatus::Redeemed);
        q.sweep_terminal();
        assert!(q.list_pending().is_empty());
        assert_eq!(q.list_history().len(), 1);
    }

    #[test]
    fn waiting_and_redeeming_entries_survive_sweep() {
        let q = PendingRedemptionQueue::new();
        q.append(entry("0x1", 0, RedemptionStatus::Waiting));
        q.append(entry("0x2", 0, RedemptionStatus::Redeeming));
        q.sweep_terminal();
        assert_eq!(q.list_pending().len(), 2);
    }
}
