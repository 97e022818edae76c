//! Session state for one mounted widget instance.
//!
//! A [`Session`] is created once per widget instance and owns everything
//! that instance needs: configuration, seed baseline, quota tracker and
//! synchronizer. Dropping it ends the instance. Every mutating call bumps
//! [`Session::revision`], so a host redraws when the revision moves.
//!
//! Local steps always run in the same order before any write is issued:
//! normalize, then quota, then ledger.

use crate::{
    config::WidgetConfig,
    normalize::normalize,
    quota::{KeyValueStore, QuotaTracker},
    rank::{rank, RankedWord},
    snapshot::seed_fields,
    store::{IncrementField, SnapshotEvent},
    sync::{AckOutcome, FailureOutcome, ReadToken, Submission, SyncState, Synchronizer},
    word::WordMap,
    DocumentId, Error, SubmissionId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message shown when a write was refused and undone.
pub const SAVE_FAILED_NOTICE: &str = "Your word couldn't be saved. Please try again.";

/// Status of a submission attempt, as reported to the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmitStatus {
    Accepted,
    Invalid,
    Limit,
}

/// Result of [`Session::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Applied locally; may carry a write to issue
    Accepted(Submission),
    /// Nothing usable after normalization
    Invalid(Error),
    /// Quota exhausted
    Limit(Error),
}

impl SubmitOutcome {
    pub fn status(&self) -> SubmitStatus {
        match self {
            SubmitOutcome::Accepted(_) => SubmitStatus::Accepted,
            SubmitOutcome::Invalid(_) => SubmitStatus::Invalid,
            SubmitOutcome::Limit(_) => SubmitStatus::Limit,
        }
    }

    /// Inline message for the participant, if any.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            SubmitOutcome::Accepted(_) => None,
            SubmitOutcome::Invalid(_) => Some("Please enter a word using letters or numbers."),
            SubmitOutcome::Limit(_) => Some("You've reached the submission limit for this cloud."),
        }
    }

    pub fn submission(&self) -> Option<&Submission> {
        match self {
            SubmitOutcome::Accepted(submission) => Some(submission),
            _ => None,
        }
    }

    /// The write this submission wants issued, if any.
    pub fn increment(&self) -> Option<(SubmissionId, IncrementField)> {
        let submission = self.submission()?;
        submission.increment.clone().map(|op| (submission.id, op))
    }
}

/// A ranked word with its palette color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWord {
    #[serde(flatten)]
    pub word: RankedWord,
    pub color: String,
}

/// Everything the presentation layer needs to draw the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudView {
    pub prompt: String,
    pub instructions: String,
    pub words: Vec<CloudWord>,
    pub remaining: u32,
    pub cap: u32,
    pub state: SyncState,
    pub revision: u64,
}

/// State of one widget instance.
#[derive(Debug)]
pub struct Session<K> {
    config: WidgetConfig,
    document_id: DocumentId,
    seed: WordMap,
    quota: QuotaTracker<K>,
    sync: Synchronizer,
    revision: u64,
    notice: Option<String>,
}

impl<K: KeyValueStore> Session<K> {
    /// Start a session. The configuration is clamped into range first.
    pub fn new(config: WidgetConfig, local_store: K) -> Self {
        let config = config.sanitized();
        let document_id = DocumentId::derive(&config);
        let seed = config.seed_entries();
        let quota = QuotaTracker::new(local_store, config.max_entries_per_participant);

        tracing::debug!(document_id = %document_id, seed_words = seed.len(), "Session created");

        Self {
            sync: Synchronizer::new(document_id.clone()),
            config,
            document_id,
            seed,
            quota,
            revision: 0,
            notice: None,
        }
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn seed(&self) -> &WordMap {
        &self.seed
    }

    pub fn state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn remaining(&self) -> u32 {
        self.quota.remaining(&self.document_id)
    }

    /// Fields to create the shared document with, if it is absent.
    pub fn initial_fields(&self) -> Value {
        seed_fields(&self.seed)
    }

    /// Normalize, check quota and apply a contribution locally.
    pub fn submit(&mut self, raw: &str) -> SubmitOutcome {
        let normalized = match normalize(raw) {
            Ok(n) => n,
            Err(e) => return SubmitOutcome::Invalid(e),
        };

        if !self.quota.consume(&self.document_id) {
            return SubmitOutcome::Limit(Error::QuotaExhausted {
                cap: self.quota.cap(),
            });
        }

        let submission = self.sync.submit(normalized.key, normalized.text);
        self.touch();
        SubmitOutcome::Accepted(submission)
    }

    /// Subscription established; returns queued writes to issue.
    pub fn initialized(&mut self) -> Vec<(SubmissionId, IncrementField)> {
        let writes = self.sync.initialized();
        self.touch();
        writes
    }

    pub fn initialization_failed(&mut self, error: &Error) {
        self.sync.initialization_failed(error);
        self.touch();
    }

    pub fn subscription_lost(&mut self, reason: &str) {
        self.sync.subscription_lost(reason);
        self.touch();
    }

    pub fn submission_succeeded(&mut self, id: SubmissionId) -> AckOutcome {
        self.sync.submission_succeeded(id)
    }

    /// A write failed. A rolled back contribution leaves a notice for the
    /// participant; the quota slot stays used.
    pub fn submission_failed(&mut self, id: SubmissionId, error: &Error) -> FailureOutcome {
        let outcome = self.sync.submission_failed(id, error);
        if outcome == FailureOutcome::RolledBack {
            self.notice = Some(SAVE_FAILED_NOTICE.to_string());
        }
        if outcome != FailureOutcome::Ignored {
            self.touch();
        }
        outcome
    }

    pub fn apply_snapshot(&mut self, event: &SnapshotEvent) {
        self.sync.apply_snapshot(&event.fields, event.has_pending_local_writes);
        self.touch();
    }

    /// Take the document read requested by [`AckOutcome::NeedsRead`].
    pub fn apply_confirmed_read(&mut self, fields: &Value, token: ReadToken) {
        if self.sync.apply_confirmed_read(fields, token) > 0 {
            self.touch();
        }
    }

    /// Take the pending transient error message, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Clear this device's quota. Preview and development only.
    pub fn reset_quota(&mut self) {
        self.quota.reset(&self.document_id);
        self.touch();
    }

    /// The ranked words, without presentation extras.
    pub fn ranked(&self) -> Vec<RankedWord> {
        rank(
            &self.seed,
            self.sync.remote(),
            &self.sync.ledger().snapshot(),
            self.config.max_words_displayed as usize,
        )
    }

    /// Build the render input.
    pub fn view(&self) -> CloudView {
        let palette = &self.config.palette;
        let words = self
            .ranked()
            .into_iter()
            .enumerate()
            .map(|(i, word)| CloudWord {
                color: palette
                    .get(i % palette.len().max(1))
                    .cloned()
                    .unwrap_or_default(),
                word,
            })
            .collect();

        CloudView {
            prompt: self.config.prompt.clone(),
            instructions: self.config.instructions.clone(),
            words,
            remaining: self.remaining(),
            cap: self.quota.cap(),
            state: self.state(),
            revision: self.revision,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}
