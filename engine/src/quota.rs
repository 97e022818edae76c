//! Per-device submission quota.
//!
//! The count lives in a device-local [`KeyValueStore`] so it survives
//! reloads. Reads clamp to `[0, cap]`, which keeps the tracker sane when an
//! author lowers the cap after participants already submitted.
//!
//! `consume` takes `&mut self`, so the read-modify-write cannot interleave
//! with another call on the same tracker. Share a tracker across threads by
//! wrapping the tracker itself in a lock, never by sharing the store
//! between two trackers.

use crate::{config::ENTRIES_PER_PARTICIPANT, DocumentId};
use std::collections::HashMap;

/// Device-local persistent string storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// Process-memory [`KeyValueStore`], for previews and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}

/// Tracks how many submissions this device made per widget instance.
#[derive(Debug)]
pub struct QuotaTracker<K> {
    store: K,
    cap: u32,
}

impl<K: KeyValueStore> QuotaTracker<K> {
    /// Create a tracker. The cap is clamped into the allowed range.
    pub fn new(store: K, cap: u32) -> Self {
        Self {
            store,
            cap: clamp_cap(cap),
        }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Change the cap, e.g. after the author edits the widget.
    pub fn set_cap(&mut self, cap: u32) {
        self.cap = clamp_cap(cap);
    }

    /// Submissions already counted, clamped to the current cap.
    pub fn used(&self, widget: &DocumentId) -> u32 {
        let raw = self.store.get(&storage_key(widget));
        let stored = match raw.as_deref().map(str::trim).map(str::parse::<i64>) {
            None => 0,
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                tracing::warn!(widget = %widget, "Unreadable quota value, treating as zero");
                0
            }
        };
        stored.clamp(0, i64::from(self.cap)) as u32
    }

    /// Slots left for this widget.
    pub fn remaining(&self, widget: &DocumentId) -> u32 {
        self.cap - self.used(widget)
    }

    /// Reserve one slot. Returns false when the cap is reached.
    pub fn consume(&mut self, widget: &DocumentId) -> bool {
        let used = self.used(widget);
        if used >= self.cap {
            return false;
        }
        self.store.set(&storage_key(widget), (used + 1).to_string());
        tracing::debug!(widget = %widget, used = used + 1, cap = self.cap, "Quota slot consumed");
        true
    }

    /// Forget this device's submissions. Preview and development only.
    pub fn reset(&mut self, widget: &DocumentId) {
        self.store.set(&storage_key(widget), "0".to_string());
        tracing::info!(widget = %widget, "Quota reset");
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn into_store(self) -> K {
        self.store
    }
}

fn clamp_cap(cap: u32) -> u32 {
    cap.clamp(*ENTRIES_PER_PARTICIPANT.start(), *ENTRIES_PER_PARTICIPANT.end())
}

fn storage_key(widget: &DocumentId) -> String {
    format!("wordcloud:{}:submissions", widget)
}
