//! Identity of the shared counter document.
//!
//! The same authored widget must always land on the same document, whether
//! or not the host supplies an explicit project id.

use crate::{config::WidgetConfig, error::Result, normalize::derive_key, Error};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const MAX_ID_LEN: usize = 128;
/// Bytes of the content hash kept in a derived id.
const HASH_PREFIX_BYTES: usize = 12;

/// Identifier of a shared counter document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Derive the document id for a widget.
    ///
    /// Uses the project id when present and usable, otherwise a hash over
    /// the authored content that defines the widget.
    pub fn derive(config: &WidgetConfig) -> Self {
        if let Some(project) = config.project_id.as_deref() {
            let slug = derive_key(project);
            if !slug.is_empty() && slug.is_ascii() && slug.len() + 8 <= MAX_ID_LEN {
                return DocumentId(format!("project-{}", slug));
            }
            tracing::debug!(project_id = %project, "Project id unusable, hashing content");
        }
        DocumentId(format!("wc-{}", content_hash(config)))
    }

    /// Parse an id received from outside, e.g. a URL path segment.
    pub fn parse(id: &str) -> Result<Self> {
        let valid = !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if valid {
            Ok(DocumentId(id.to_string()))
        } else {
            Err(Error::InvalidDocumentId(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn content_hash(config: &WidgetConfig) -> String {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, config.prompt.as_bytes());
    update_field(&mut hasher, config.instructions.as_bytes());
    hasher.update((config.starter_words.len() as u64).to_le_bytes());
    for word in &config.starter_words {
        update_field(&mut hasher, word.text.as_bytes());
        hasher.update(word.weight.to_le_bytes());
    }
    hasher.update(config.max_entries_per_participant.to_le_bytes());

    let digest = hasher.finalize();
    digest[..HASH_PREFIX_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
