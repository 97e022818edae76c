//! Widget configuration supplied by the authoring layer.
//!
//! Values outside their documented ranges are clamped, not rejected: an
//! authoring mistake should never stop a widget from rendering.

use crate::{
    error::Result,
    normalize::normalize,
    word::{WordEntry, WordMap},
    Error,
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Allowed per-participant submission caps.
pub const ENTRIES_PER_PARTICIPANT: RangeInclusive<u32> = 1..=6;
/// Allowed display limits.
pub const WORDS_DISPLAYED: RangeInclusive<u32> = 10..=150;
/// Allowed starter word weights.
pub const STARTER_WEIGHT: RangeInclusive<u32> = 1..=8;

const DEFAULT_PALETTE: [&str; 5] = ["#2563eb", "#db2777", "#16a34a", "#ea580c", "#7c3aed"];

/// An author-supplied example word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarterWord {
    pub text: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl StarterWord {
    pub fn new(text: impl Into<String>, weight: u32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// Configuration of one word cloud widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    /// Explicit identity for the shared document, if the host has one
    pub project_id: Option<String>,
    pub prompt: String,
    pub instructions: String,
    pub max_entries_per_participant: u32,
    pub max_words_displayed: u32,
    pub palette: Vec<String>,
    pub starter_words: Vec<StarterWord>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            prompt: String::new(),
            instructions: String::new(),
            max_entries_per_participant: 3,
            max_words_displayed: 50,
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            starter_words: Vec::new(),
        }
    }
}

impl WidgetConfig {
    /// Parse configuration JSON and clamp it into range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: WidgetConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(config.sanitized())
    }

    /// Clamp every bounded field into its documented range.
    pub fn sanitized(mut self) -> Self {
        self.max_entries_per_participant = clamp(
            self.max_entries_per_participant,
            &ENTRIES_PER_PARTICIPANT,
        );
        self.max_words_displayed = clamp(self.max_words_displayed, &WORDS_DISPLAYED);
        for word in &mut self.starter_words {
            word.weight = clamp(word.weight, &STARTER_WEIGHT);
        }
        self.palette.retain(|c| !c.trim().is_empty());
        if self.palette.is_empty() {
            self.palette = WidgetConfig::default().palette;
        }
        self
    }

    /// Normalize starter words into the seed baseline.
    ///
    /// Starter words sharing a key merge: weights add up and the later
    /// text wins. Words that normalize to nothing are skipped.
    pub fn seed_entries(&self) -> WordMap {
        let mut seed = WordMap::new();
        for word in &self.starter_words {
            let normalized = match normalize(&word.text) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(text = %word.text, "Skipping starter word: {}", e);
                    continue;
                }
            };
            let weight = u64::from(clamp(word.weight, &STARTER_WEIGHT));
            seed.entry(normalized.key)
                .and_modify(|entry| {
                    entry.count += weight;
                    entry.text = normalized.text.clone();
                })
                .or_insert_with(|| WordEntry::new(normalized.text, weight));
        }
        seed
    }
}

fn clamp(value: u32, range: &RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_with_defaults() {
        let config = WidgetConfig::from_json(
            r#"{
                "prompt": "One word for today?",
                "maxEntriesPerParticipant": 2,
                "starterWords": [{"text": "Inspired", "weight": 2}, {"text": "calm"}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.prompt, "One word for today?");
        assert_eq!(config.instructions, "");
        assert_eq!(config.max_entries_per_participant, 2);
        assert_eq!(config.max_words_displayed, 50);
        assert_eq!(config.starter_words[1].weight, 1);
        assert!(!config.palette.is_empty());
    }

    #[test]
    fn clamps_out_of_range_values() {
        let config = WidgetConfig::from_json(
            r#"{
                "maxEntriesPerParticipant": 40,
                "maxWordsDisplayed": 3,
                "palette": [" "],
                "starterWords": [{"text": "big", "weight": 99}, {"text": "small", "weight": 0}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_entries_per_participant, 6);
        assert_eq!(config.max_words_displayed, 10);
        assert_eq!(config.starter_words[0].weight, 8);
        assert_eq!(config.starter_words[1].weight, 1);
        assert_eq!(config.palette, WidgetConfig::default().palette);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = WidgetConfig::from_json(r#"{"maxEntriesPerParticipant": "many"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn seed_entries_merge_by_key() {
        let config = WidgetConfig {
            starter_words: vec![
                StarterWord::new("Inspired", 2),
                StarterWord::new("inspired!", 3),
                StarterWord::new("???", 4),
                StarterWord::new("Calm", 1),
            ],
            ..WidgetConfig::default()
        };

        let seed = config.seed_entries();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed["inspired"], WordEntry::new("inspired", 5));
        assert_eq!(seed["calm"], WordEntry::new("Calm", 1));
    }
}
