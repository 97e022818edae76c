//! Word entries shared by the seed, the remote snapshot and the ledger.

use crate::WordKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a word's count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Authored starter word
    Seed,
    /// Confirmed shared state
    Remote,
    /// Applied locally, not yet confirmed
    Optimistic,
}

/// Display text and count for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    /// Most recently known display form
    pub text: String,
    /// Accumulated count
    pub count: u64,
}

impl WordEntry {
    pub fn new(text: impl Into<String>, count: u64) -> Self {
        Self {
            text: text.into(),
            count,
        }
    }
}

/// Words keyed by canonical key. Ordered so iteration is deterministic.
pub type WordMap = BTreeMap<WordKey, WordEntry>;
