//! Optimistic ledger - this client's unconfirmed contributions.
//!
//! Entries hold a signed delta per key. Every [`OptimisticLedger::apply`]
//! hands back a [`RollbackHandle`] describing exactly what it added, so a
//! failed submission can undo itself without disturbing other in-flight
//! submissions for the same key.

use crate::{
    word::{WordEntry, WordMap},
    WordKey,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Undo token returned by [`OptimisticLedger::apply`].
///
/// Not `Clone`: each handle is consumed exactly once, by either a
/// rollback or a settlement. A handle issued before [`OptimisticLedger::clear`]
/// no longer applies to anything.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackHandle {
    pub key: WordKey,
    pub delta: i64,
    /// Ledger generation the handle was issued in
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingEntry {
    text: String,
    delta: i64,
}

/// In-memory overlay of unconfirmed contributions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimisticLedger {
    entries: BTreeMap<WordKey, PendingEntry>,
    /// Bumped by `clear`
    generation: u64,
}

impl OptimisticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one contribution for `key` and record its display text.
    pub fn apply(&mut self, key: impl Into<WordKey>, text: impl Into<String>) -> RollbackHandle {
        let key = key.into();
        let text = text.into();
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| PendingEntry {
                text: String::new(),
                delta: 0,
            });
        entry.delta += 1;
        if !text.is_empty() {
            entry.text = text;
        }
        RollbackHandle {
            key,
            delta: 1,
            generation: self.generation,
        }
    }

    /// Undo exactly what `handle` added.
    pub fn rollback(&mut self, handle: RollbackHandle) {
        tracing::debug!(key = %handle.key, delta = handle.delta, "Rolling back optimistic entry");
        self.remove(handle);
    }

    /// Drop a contribution that the remote snapshot now carries.
    pub fn settle(&mut self, handle: RollbackHandle) {
        tracing::debug!(key = %handle.key, delta = handle.delta, "Settling optimistic entry");
        self.remove(handle);
    }

    fn remove(&mut self, handle: RollbackHandle) {
        if handle.generation != self.generation {
            tracing::debug!(key = %handle.key, "Ignoring handle from before clear");
            return;
        }
        if let Some(entry) = self.entries.get_mut(&handle.key) {
            entry.delta -= handle.delta;
            if entry.delta <= 0 {
                self.entries.remove(&handle.key);
            }
        }
    }

    /// Forget every entry. Outstanding handles become no-ops.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    /// Current delta for a key, zero if absent.
    pub fn delta(&self, key: &str) -> i64 {
        self.entries.get(key).map_or(0, |e| e.delta)
    }

    /// Positive entries as word counts.
    pub fn snapshot(&self) -> WordMap {
        self.entries
            .iter()
            .filter(|(_, e)| e.delta > 0)
            .map(|(key, e)| (key.clone(), WordEntry::new(e.text.clone(), e.delta as u64)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
