//! Error types for the word cloud engine.

use crate::{SubmissionId, WordKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the document store failed a request.
///
/// The distinction drives recovery: a rejected write only undoes itself,
/// an unavailable store sends the whole session offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreErrorKind {
    /// The store refused this particular request
    Rejected,
    /// The store could not be reached
    Unavailable,
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreErrorKind::Rejected => write!(f, "rejected"),
            StoreErrorKind::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// All possible errors from the word cloud engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Input errors
    #[error("input rejected: {0:?} has no usable characters")]
    InputRejected(String),

    #[error("submission limit reached ({cap} per participant)")]
    QuotaExhausted { cap: u32 },

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Remote errors
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("store {kind}: {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
    },

    // State errors
    #[error("unknown submission: {0}")]
    UnknownSubmission(SubmissionId),

    #[error("invalid key: {0:?}")]
    InvalidKey(WordKey),

    #[error("invalid document id: {0:?}")]
    InvalidDocumentId(String),
}

impl Error {
    /// A store error for a single refused request.
    pub fn rejected(message: impl Into<String>) -> Self {
        Error::Store {
            kind: StoreErrorKind::Rejected,
            message: message.into(),
        }
    }

    /// A store error for a connectivity failure.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Error::Store {
            kind: StoreErrorKind::Unavailable,
            message: message.into(),
        }
    }

    /// The store failure classification, if this is a store error.
    pub fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            Error::Store { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
