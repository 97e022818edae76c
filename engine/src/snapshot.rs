//! Remote snapshots of the shared counter document.
//!
//! The document holds one map, `words`, from canonical key to
//! `{ "text": .., "count": .. }`. Snapshots replace each other wholesale;
//! nothing here diffs them.

use crate::{
    error::Result,
    word::{WordEntry, WordMap},
    Error,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Name of the words map inside the document.
pub const WORDS_FIELD: &str = "words";

/// Last known authoritative shared state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub words: WordMap,
}

impl RemoteSnapshot {
    pub fn new(words: WordMap) -> Self {
        Self { words }
    }

    /// Parse raw document fields.
    ///
    /// A document without a `words` map is an empty snapshot. Any entry of
    /// unexpected shape makes the whole snapshot malformed.
    pub fn from_fields(fields: &Value) -> Result<Self> {
        let document = fields
            .as_object()
            .ok_or_else(|| malformed("document is not an object"))?;

        let words = match document.get(WORDS_FIELD) {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(words)) => words,
            Some(_) => return Err(malformed("`words` is not an object")),
        };

        let mut parsed = WordMap::new();
        for (key, value) in words {
            if key.is_empty() {
                return Err(malformed("empty word key"));
            }
            parsed.insert(key.clone(), parse_entry(key, value)?);
        }
        Ok(Self { words: parsed })
    }

    /// Render back into document fields.
    pub fn to_fields(&self) -> Value {
        words_to_fields(self.words.iter().map(|(k, e)| (k, e.text.as_str(), e.count)))
    }

    pub fn get(&self, key: &str) -> Option<&WordEntry> {
        self.words.get(key)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Initial document fields for a fresh document.
///
/// Seed words are written with a zero count: their authored weight is
/// added by the aggregator, so storing it remotely would count it twice.
pub fn seed_fields(seed: &WordMap) -> Value {
    words_to_fields(seed.iter().map(|(k, e)| (k, e.text.as_str(), 0)))
}

fn words_to_fields<'a>(words: impl Iterator<Item = (&'a String, &'a str, u64)>) -> Value {
    let words: Map<String, Value> = words
        .map(|(key, text, count)| (key.clone(), json!({ "text": text, "count": count })))
        .collect();
    let mut document = Map::new();
    document.insert(WORDS_FIELD.to_string(), Value::Object(words));
    Value::Object(document)
}

fn parse_entry(key: &str, value: &Value) -> Result<WordEntry> {
    let entry = value
        .as_object()
        .ok_or_else(|| malformed(format!("entry `{}` is not an object", key)))?;

    let count = entry
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(format!("entry `{}` has no non-negative integer count", key)))?;

    let text = match entry.get("text") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(malformed(format!("entry `{}` has non-string text", key))),
    };

    Ok(WordEntry::new(text, count))
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedSnapshot(reason.into())
}
