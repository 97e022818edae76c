//! # Word Cloud Engine
//!
//! Collaborative aggregation and sync engine for word cloud widgets.
//!
//! Many participants submit short words. Each submission is normalized to a
//! canonical key, checked against a per-device quota, applied optimistically,
//! and written to a shared counter document as a pure increment. The engine
//! merges the authored seed words, the last authoritative snapshot and this
//! client's unconfirmed writes into one deterministic ranking.
//!
//! ## Design Principles
//!
//! - **No IO in the core**: the store is reached only through the
//!   [`DocumentStore`] and [`KeyValueStore`] traits
//! - **Deterministic**: keys, merges and rankings depend only on their inputs
//! - **Degrades, never fails**: any store failure ends in offline mode with
//!   the local record intact
//!
//! ## Components
//!
//! - [`normalize()`] - raw input to key and display text
//! - [`QuotaTracker`] - per-device submission cap
//! - [`OptimisticLedger`] - unconfirmed writes with exact rollback
//! - [`Synchronizer`] - `Initializing` / `Connected` / `Offline` state machine
//! - [`rank()`] - merge and order for display
//! - [`Session`] - owns all of the above for one widget instance
//! - [`WordCloudClient`] - drives a session against a store
//!
//! ## Quick Start
//!
//! ```rust
//! use wordcloud_engine::{
//!     Error, MemoryKeyValueStore, Session, StarterWord, SubmitStatus, WidgetConfig,
//! };
//!
//! let config = WidgetConfig {
//!     prompt: "One word for today?".into(),
//!     max_entries_per_participant: 2,
//!     starter_words: vec![StarterWord::new("Inspired", 2)],
//!     ..WidgetConfig::default()
//! };
//! let mut session = Session::new(config, MemoryKeyValueStore::new());
//!
//! // No store reachable: everything stays local.
//! session.initialization_failed(&Error::unavailable("preview"));
//!
//! assert_eq!(session.submit("inspired!").status(), SubmitStatus::Accepted);
//! assert_eq!(session.submit("  ").status(), SubmitStatus::Invalid);
//!
//! let view = session.view();
//! assert_eq!(view.words[0].word.key, "inspired");
//! assert_eq!(view.words[0].word.count, 3);
//! assert_eq!(view.remaining, 1);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod normalize;
pub mod quota;
pub mod rank;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod word;

// Re-export main types at crate root
pub use client::WordCloudClient;
pub use config::{StarterWord, WidgetConfig};
pub use error::{Error, StoreErrorKind};
pub use identity::DocumentId;
pub use ledger::{OptimisticLedger, RollbackHandle};
pub use normalize::{normalize, Normalized};
pub use quota::{KeyValueStore, MemoryKeyValueStore, QuotaTracker};
pub use rank::{rank, RankedWord};
pub use session::{CloudView, CloudWord, Session, SubmitOutcome, SubmitStatus};
pub use snapshot::RemoteSnapshot;
pub use store::{DocumentStore, IncrementField, MemoryDocumentStore, SnapshotEvent, SnapshotStream};
pub use sync::{AckOutcome, FailureOutcome, ReadToken, Submission, SyncState, Synchronizer};
pub use word::{Source, WordEntry, WordMap};

/// Type aliases for clarity
pub type WordKey = String;
pub type SubmissionId = u64;
