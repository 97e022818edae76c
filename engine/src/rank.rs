//! Aggregation and ranking for display.
//!
//! Counts from the seed, the remote snapshot and the optimistic ledger
//! always add up. Display text comes from the most live source that has
//! one: optimistic, then remote, then seed.
//!
//! # Ordering
//!
//! 1. Higher combined count first
//! 2. Case-insensitive display text, ascending
//! 3. Key, ascending
//!
//! Keys are unique, so the order is total and sorting is idempotent.

use crate::{
    snapshot::RemoteSnapshot,
    word::{Source, WordMap},
    WordKey,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One word ready for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedWord {
    pub key: WordKey,
    pub text: String,
    pub count: u64,
    /// `count / max count` over the displayed words, in `(0, 1]`
    pub weight: f64,
    /// Which source supplied the display text
    pub text_source: Source,
}

#[derive(Debug)]
struct Merged<'a> {
    count: u64,
    text: &'a str,
    source: Source,
}

/// Merge all sources and return the top `limit` words.
///
/// `remote` is `None` until a first snapshot arrives; that is "unknown",
/// not "zero". Words whose combined count is zero are left out.
pub fn rank(
    seed: &WordMap,
    remote: Option<&RemoteSnapshot>,
    optimistic: &WordMap,
    limit: usize,
) -> Vec<RankedWord> {
    let mut merged: BTreeMap<&str, Merged<'_>> = BTreeMap::new();

    let remote_words = remote.map(|r| &r.words);
    let sources = [
        (Some(seed), Source::Seed),
        (remote_words, Source::Remote),
        (Some(optimistic), Source::Optimistic),
    ];

    // Ascending display priority, so later non-empty text overrides.
    for (words, source) in sources {
        let Some(words) = words else {
            continue;
        };
        for (key, entry) in words {
            let slot = merged.entry(key.as_str()).or_insert(Merged {
                count: 0,
                text: "",
                source,
            });
            slot.count = slot.count.saturating_add(entry.count);
            if !entry.text.is_empty() {
                slot.text = &entry.text;
                slot.source = source;
            }
        }
    }

    let mut ranked: Vec<(String, RankedWord)> = merged
        .into_iter()
        .filter(|(_, m)| m.count > 0)
        .map(|(key, m)| {
            let text = if m.text.is_empty() { key } else { m.text };
            let word = RankedWord {
                key: key.to_string(),
                text: text.to_string(),
                count: m.count,
                weight: 0.0,
                text_source: m.source,
            };
            (text.to_lowercase(), word)
        })
        .collect();

    ranked.sort_by(|(a_fold, a), (b_fold, b)| compare(a_fold, a, b_fold, b));
    ranked.truncate(limit);

    let max_count = ranked.first().map_or(0, |(_, w)| w.count);
    ranked
        .into_iter()
        .map(|(_, mut word)| {
            word.weight = word.count as f64 / max_count as f64;
            word
        })
        .collect()
}

/// Display order between two ranked words.
pub fn display_order(a: &RankedWord, b: &RankedWord) -> Ordering {
    compare(&a.text.to_lowercase(), a, &b.text.to_lowercase(), b)
}

fn compare(a_fold: &str, a: &RankedWord, b_fold: &str, b: &RankedWord) -> Ordering {
    b.count
        .cmp(&a.count)
        .then_with(|| a_fold.cmp(b_fold))
        .then_with(|| a.key.cmp(&b.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::WordEntry;
    use proptest::prelude::*;

    fn words(entries: &[(&str, &str, u64)]) -> WordMap {
        entries
            .iter()
            .map(|(k, t, c)| (k.to_string(), WordEntry::new(*t, *c)))
            .collect()
    }

    #[test]
    fn seed_and_remote_counts_add() {
        let seed = words(&[("inspired", "Inspired", 2)]);
        let remote = RemoteSnapshot::new(words(&[("inspired", "inspired", 1)]));

        let ranked = rank(&seed, Some(&remote), &WordMap::new(), 50);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key, "inspired");
        assert_eq!(ranked[0].count, 3);
    }

    #[test]
    fn all_three_sources_add() {
        let seed = words(&[("calm", "Calm", 1)]);
        let remote = RemoteSnapshot::new(words(&[("calm", "calm", 4)]));
        let optimistic = words(&[("calm", "CALM", 2)]);

        let ranked = rank(&seed, Some(&remote), &optimistic, 50);
        assert_eq!(ranked[0].count, 7);
        assert_eq!(ranked[0].text, "CALM");
        assert_eq!(ranked[0].text_source, Source::Optimistic);
    }

    #[test]
    fn display_text_priority() {
        let seed = words(&[("a", "Seed A", 1), ("b", "Seed B", 1), ("c", "Seed C", 1)]);
        let remote = RemoteSnapshot::new(words(&[("b", "Remote B", 1), ("c", "", 1)]));
        let optimistic = words(&[("c", "", 1)]);

        let ranked = rank(&seed, Some(&remote), &optimistic, 50);
        let text_of = |key: &str| {
            ranked
                .iter()
                .find(|w| w.key == key)
                .map(|w| (w.text.clone(), w.text_source))
                .unwrap()
        };

        assert_eq!(text_of("a"), ("Seed A".to_string(), Source::Seed));
        assert_eq!(text_of("b"), ("Remote B".to_string(), Source::Remote));
        // Empty text never wins.
        assert_eq!(text_of("c"), ("Seed C".to_string(), Source::Seed));
    }

    #[test]
    fn falls_back_to_key_without_any_text() {
        let remote = RemoteSnapshot::new(words(&[("quiet", "", 2)]));
        let ranked = rank(&WordMap::new(), Some(&remote), &WordMap::new(), 50);
        assert_eq!(ranked[0].text, "quiet");
    }

    #[test]
    fn limit_keeps_the_highest() {
        let remote = RemoteSnapshot::new(words(&[
            ("one", "one", 1),
            ("five", "five", 5),
            ("three", "three", 3),
        ]));

        let ranked = rank(&WordMap::new(), Some(&remote), &WordMap::new(), 2);
        let counts: Vec<u64> = ranked.iter().map(|w| w.count).collect();
        assert_eq!(counts, vec![5, 3]);
        assert_eq!(ranked[0].key, "five");
        assert_eq!(ranked[1].key, "three");
    }

    #[test]
    fn ties_break_case_insensitively() {
        let remote = RemoteSnapshot::new(words(&[
            ("banana", "banana", 2),
            ("apple", "Apple", 2),
            ("cherry", "CHERRY", 2),
        ]));

        let ranked = rank(&WordMap::new(), Some(&remote), &WordMap::new(), 50);
        let keys: Vec<&str> = ranked.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn zero_counts_are_hidden() {
        let remote = RemoteSnapshot::new(words(&[("gone", "Gone", 0), ("here", "Here", 1)]));
        let ranked = rank(&WordMap::new(), Some(&remote), &WordMap::new(), 50);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key, "here");
    }

    #[test]
    fn weights_are_relative_to_the_top() {
        let remote = RemoteSnapshot::new(words(&[("a", "a", 4), ("b", "b", 2), ("c", "c", 1)]));
        let ranked = rank(&WordMap::new(), Some(&remote), &WordMap::new(), 50);
        let weights: Vec<f64> = ranked.iter().map(|w| w.weight).collect();
        assert_eq!(weights, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn no_remote_is_not_zero() {
        let seed = words(&[("calm", "Calm", 2)]);
        let optimistic = words(&[("calm", "calm", 1)]);
        let ranked = rank(&seed, None, &optimistic, 50);
        assert_eq!(ranked[0].count, 3);
    }

    #[test]
    fn empty_inputs() {
        assert!(rank(&WordMap::new(), None, &WordMap::new(), 50).is_empty());
        let seed = words(&[("calm", "Calm", 2)]);
        assert!(rank(&seed, None, &WordMap::new(), 0).is_empty());
    }

    fn word_map() -> impl Strategy<Value = WordMap> {
        prop::collection::btree_map("[a-e]{1,2}", ("[a-eA-E]{0,3}", 0u64..6), 0..8).prop_map(
            |m| {
                m.into_iter()
                    .map(|(k, (t, c))| (k, WordEntry::new(t, c)))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn ranking_is_a_total_order(
            seed in word_map(),
            remote in word_map(),
            optimistic in word_map(),
            limit in 0usize..20,
        ) {
            let remote = RemoteSnapshot::new(remote);
            let ranked = rank(&seed, Some(&remote), &optimistic, limit);

            prop_assert!(ranked.len() <= limit);
            for pair in ranked.windows(2) {
                prop_assert_eq!(display_order(&pair[0], &pair[1]), Ordering::Less);
            }

            let mut resorted = ranked.clone();
            resorted.sort_by(display_order);
            prop_assert_eq!(resorted, ranked);
        }

        #[test]
        fn merge_ignores_arrival_order(
            entries in prop::collection::vec(("[a-d]", "[a-dA-D]{1,3}", 1u64..5), 0..12),
        ) {
            // Same final snapshot content, built in opposite orders.
            let forward: WordMap = entries
                .iter()
                .map(|(k, t, c)| (k.clone(), WordEntry::new(t.clone(), *c)))
                .collect();
            let mut backward = WordMap::new();
            for (k, _, _) in entries.iter().rev() {
                backward.insert(k.clone(), forward[k].clone());
            }

            let (forward, backward) = (RemoteSnapshot::new(forward), RemoteSnapshot::new(backward));
            let a = rank(&WordMap::new(), Some(&forward), &WordMap::new(), 150);
            let b = rank(&WordMap::new(), Some(&backward), &WordMap::new(), 150);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn truncation_happens_after_sorting(
            remote in word_map(),
            limit in 1usize..6,
        ) {
            let remote = RemoteSnapshot::new(remote);
            let all = rank(&WordMap::new(), Some(&remote), &WordMap::new(), usize::MAX);
            let top = rank(&WordMap::new(), Some(&remote), &WordMap::new(), limit);

            let expected: Vec<&str> = all.iter().take(limit).map(|w| w.key.as_str()).collect();
            let actual: Vec<&str> = top.iter().map(|w| w.key.as_str()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
