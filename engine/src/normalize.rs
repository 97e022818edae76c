//! Normalization of raw participant input.
//!
//! Every contribution passes through [`normalize`] before it can touch the
//! quota or the ledger. The display text keeps the participant's casing and
//! accents; the key folds both away so "Café", "cafe" and "CAFÉ!!" land on
//! the same counter.

use crate::{error::Result, Error, WordKey};
use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Maximum display length in characters.
pub const MAX_DISPLAY_LEN: usize = 36;

/// Upper bound on a key's byte length. Compatibility decomposition can
/// expand a short display text, so this is looser than the display limit.
pub const MAX_KEY_BYTES: usize = 256;

/// A normalized contribution: canonical key plus display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalized {
    pub key: WordKey,
    pub text: String,
}

/// Normalize raw input into a key and display text.
///
/// Rejects input whose cleaned form yields an empty key.
pub fn normalize(raw: &str) -> Result<Normalized> {
    let text = clean_text(raw);
    let key = derive_key(&text);
    if key.is_empty() {
        return Err(Error::InputRejected(raw.to_string()));
    }
    Ok(Normalized { key, text })
}

/// Produce the display form of raw input.
///
/// Composes to NFC, keeps letters, numbers, apostrophes and hyphens,
/// collapses whitespace runs to one space and truncates to
/// [`MAX_DISPLAY_LEN`] characters.
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_DISPLAY_LEN * 4));
    let mut pending_space = false;
    let mut len = 0;

    for c in raw.nfc() {
        if len == MAX_DISPLAY_LEN {
            break;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        let Some(c) = allowed(c) else {
            continue;
        };
        if pending_space && len > 0 {
            if len + 1 == MAX_DISPLAY_LEN {
                break;
            }
            out.push(' ');
            len += 1;
        }
        pending_space = false;
        out.push(c);
        len += 1;
    }

    out
}

/// Derive the canonical key of already-cleaned text.
///
/// Lowercase, diacritics removed, every run of non-alphanumeric characters
/// replaced by a single hyphen, no leading or trailing hyphen, at most
/// [`MAX_KEY_BYTES`] long. Pure and locale independent.
pub fn derive_key(text: &str) -> WordKey {
    let mut key = String::with_capacity(text.len());
    let mut separator = false;

    for c in text.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if separator && !key.is_empty() {
                key.push('-');
            }
            separator = false;
            key.extend(c.to_lowercase());
        } else {
            separator = true;
        }
    }

    if key.len() > MAX_KEY_BYTES {
        let mut end = MAX_KEY_BYTES;
        while !key.is_char_boundary(end) {
            end -= 1;
        }
        key.truncate(end);
        while key.ends_with('-') {
            key.pop();
        }
    }
    key
}

/// Check that a key is one [`derive_key`] could have produced.
pub fn is_canonical_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_BYTES && derive_key(key) == key
}

fn allowed(c: char) -> Option<char> {
    match c {
        '\'' | '-' => Some(c),
        '\u{2019}' => Some('\''),
        c if c.is_alphanumeric() => Some(c),
        _ => None,
    }
}
