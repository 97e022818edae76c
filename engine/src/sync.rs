//! Remote synchronizer - the connection state machine.
//!
//! Like the rest of the engine this performs no IO. It decides which
//! increments to issue and reacts to what the store reports back; the
//! [`crate::client`] module drives it against a real [`crate::DocumentStore`].
//!
//! # States
//!
//! ```text
//! Initializing ──ok──▶ Connected
//!      │                  │ unavailable store / subscription lost
//!      └──failed──▶ Offline ◀┘
//! ```
//!
//! There is no way back from `Offline` within a session.
//!
//! # Reconciliation
//!
//! Every issued increment keeps its [`RollbackHandle`] until one of:
//! - the store acknowledges the write and a later snapshot arrives flagged
//!   with no pending local writes: every acknowledged handle settles;
//! - the store rejects the write: that handle alone rolls back.
//!
//! A clean snapshot says nothing about writes still in flight, so those
//! stay issued and remain subject to failure handling. A write acknowledged
//! after a clean snapshot already went by asks for a confirming read
//! ([`AckOutcome::NeedsRead`]) instead of waiting for a snapshot that may
//! never come.

use crate::{
    error::Result,
    ledger::{OptimisticLedger, RollbackHandle},
    snapshot::RemoteSnapshot,
    store::IncrementField,
    DocumentId, Error, StoreErrorKind, SubmissionId, WordKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Connection state of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Initializing,
    Connected,
    Offline,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Initializing => write!(f, "initializing"),
            SyncState::Connected => write!(f, "connected"),
            SyncState::Offline => write!(f, "offline"),
        }
    }
}

/// A locally applied submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub key: WordKey,
    pub text: String,
    /// The write to issue now, if any. `None` while initializing (issued
    /// later) or offline (never issued).
    pub increment: Option<IncrementField>,
}

/// Outcome of a failed write, as far as the participant is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureOutcome {
    /// The contribution was undone
    RolledBack,
    /// The session went offline and kept the contribution locally
    KeptOffline,
    /// Nothing left to undo
    Ignored,
}

/// What the driver should do after the store acknowledged a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AckOutcome {
    /// Settles with the next clean snapshot
    AwaitingSnapshot,
    /// A clean snapshot went by while the write was in flight. Read the
    /// document once and hand it to [`Synchronizer::apply_confirmed_read`].
    NeedsRead(ReadToken),
    /// Already settled, rolled back or dropped by going offline
    Ignored,
}

/// Identifies which acknowledgements a confirming read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadToken(u64);

#[derive(Debug)]
struct InFlight {
    handle: RollbackHandle,
    /// A clean snapshot arrived while this write was unacknowledged
    clean_seen: bool,
}

#[derive(Debug)]
struct Acknowledged {
    seq: u64,
    handle: RollbackHandle,
}

/// Connection state plus the optimistic overlay for one document.
#[derive(Debug)]
pub struct Synchronizer {
    document_id: DocumentId,
    state: SyncState,
    remote: Option<RemoteSnapshot>,
    ledger: OptimisticLedger,
    /// Submitted while initializing; issued once connected
    queued: BTreeMap<SubmissionId, RollbackHandle>,
    /// Issued to the store, no verdict yet
    issued: BTreeMap<SubmissionId, InFlight>,
    /// Accepted by the store, waiting to show up in a clean snapshot
    acked: BTreeMap<SubmissionId, Acknowledged>,
    next_id: SubmissionId,
    ack_seq: u64,
}

impl Synchronizer {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            state: SyncState::Initializing,
            remote: None,
            ledger: OptimisticLedger::new(),
            queued: BTreeMap::new(),
            issued: BTreeMap::new(),
            acked: BTreeMap::new(),
            next_id: 1,
            ack_seq: 0,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Last known authoritative snapshot, `None` until the first arrives.
    pub fn remote(&self) -> Option<&RemoteSnapshot> {
        self.remote.as_ref()
    }

    pub fn ledger(&self) -> &OptimisticLedger {
        &self.ledger
    }

    /// Submissions whose writes are outstanding.
    pub fn pending(&self) -> usize {
        self.queued.len() + self.issued.len() + self.acked.len()
    }

    /// Subscription established. Returns the queued writes to issue now.
    pub fn initialized(&mut self) -> Vec<(SubmissionId, IncrementField)> {
        if self.state != SyncState::Initializing {
            tracing::warn!(state = %self.state, "Ignoring late initialization");
            return Vec::new();
        }
        self.transition(SyncState::Connected);

        let queued = std::mem::take(&mut self.queued);
        let mut writes = Vec::with_capacity(queued.len());
        for (id, handle) in queued {
            let text = self.ledger_text(&handle.key);
            writes.push((id, self.increment_for(&handle.key, text)));
            self.issue(id, handle);
        }
        writes
    }

    /// Initialization failed. Everything applied so far stays local.
    pub fn initialization_failed(&mut self, error: &Error) {
        tracing::info!(document_id = %self.document_id, "Initialization failed, going offline: {}", error);
        self.go_offline();
    }

    /// The subscription broke or closed.
    pub fn subscription_lost(&mut self, reason: &str) {
        if self.state == SyncState::Offline {
            return;
        }
        tracing::info!(document_id = %self.document_id, "Subscription lost, going offline: {}", reason);
        self.go_offline();
    }

    /// Apply a contribution locally and decide whether to write it.
    pub fn submit(&mut self, key: WordKey, text: String) -> Submission {
        let id = self.next_id;
        self.next_id += 1;
        let handle = self.ledger.apply(key.clone(), text.clone());

        let increment = match self.state {
            SyncState::Initializing => {
                self.queued.insert(id, handle);
                None
            }
            SyncState::Connected => {
                self.issue(id, handle);
                Some(self.increment_for(&key, text.clone()))
            }
            // The ledger is the permanent record now.
            SyncState::Offline => None,
        };

        tracing::debug!(
            submission = id,
            key = %key,
            state = %self.state,
            "Submission applied locally"
        );

        Submission {
            id,
            key,
            text,
            increment,
        }
    }

    /// The store accepted a write.
    ///
    /// The entry settles with the next clean snapshot. If one already
    /// arrived while the write was in flight, the caller is asked for a
    /// confirming read instead.
    pub fn submission_succeeded(&mut self, id: SubmissionId) -> AckOutcome {
        let Some(in_flight) = self.issued.remove(&id) else {
            tracing::debug!(submission = id, "Acknowledgement for settled submission");
            return AckOutcome::Ignored;
        };

        self.ack_seq += 1;
        let seq = self.ack_seq;
        tracing::debug!(submission = id, clean_seen = in_flight.clean_seen, "Write acknowledged");
        self.acked.insert(
            id,
            Acknowledged {
                seq,
                handle: in_flight.handle,
            },
        );

        if in_flight.clean_seen {
            AckOutcome::NeedsRead(ReadToken(seq))
        } else {
            AckOutcome::AwaitingSnapshot
        }
    }

    /// The store failed a write.
    ///
    /// A rejected write rolls back its own entry. An unavailable store
    /// takes the session offline and the entry stays as the local record.
    /// The quota slot is never refunded either way.
    pub fn submission_failed(&mut self, id: SubmissionId, error: &Error) -> FailureOutcome {
        let Some(InFlight { handle, .. }) = self.issued.remove(&id) else {
            tracing::debug!(submission = id, "Failure for settled submission: {}", error);
            return FailureOutcome::Ignored;
        };

        if self.state == SyncState::Offline {
            return FailureOutcome::KeptOffline;
        }

        match error.store_kind() {
            Some(StoreErrorKind::Unavailable) => {
                tracing::warn!(submission = id, key = %handle.key, "Store unavailable, going offline: {}", error);
                self.go_offline();
                FailureOutcome::KeptOffline
            }
            _ => {
                tracing::warn!(submission = id, key = %handle.key, "Write failed, rolling back: {}", error);
                self.ledger.rollback(handle);
                FailureOutcome::RolledBack
            }
        }
    }

    /// Take a new authoritative snapshot.
    ///
    /// A malformed snapshot counts as empty for this cycle. Settles
    /// acknowledged writes only when the store says no local writes are
    /// pending; an absent flag counts as pending. Writes still in flight are
    /// left alone. Returns how many entries settled.
    pub fn apply_snapshot(
        &mut self,
        fields: &Value,
        has_pending_local_writes: Option<bool>,
    ) -> usize {
        if self.state == SyncState::Offline {
            tracing::debug!(document_id = %self.document_id, "Ignoring snapshot while offline");
            return 0;
        }

        self.remote = Some(self.parse_snapshot(fields));

        if has_pending_local_writes != Some(false) {
            return 0;
        }

        for in_flight in self.issued.values_mut() {
            in_flight.clean_seen = true;
        }
        self.settle_acked(u64::MAX)
    }

    /// Take the result of a confirming read requested by
    /// [`AckOutcome::NeedsRead`].
    ///
    /// Settles every write acknowledged before the read was requested. If a
    /// clean snapshot already settled them, the read is stale and dropped.
    pub fn apply_confirmed_read(&mut self, fields: &Value, token: ReadToken) -> usize {
        if self.state == SyncState::Offline {
            tracing::debug!(document_id = %self.document_id, "Ignoring confirming read while offline");
            return 0;
        }
        if !self.acked.values().any(|a| a.seq <= token.0) {
            return 0;
        }

        self.remote = Some(self.parse_snapshot(fields));
        self.settle_acked(token.0)
    }

    /// Look up a submission that is still outstanding.
    pub fn outstanding(&self, id: SubmissionId) -> Result<&WordKey> {
        self.queued
            .get(&id)
            .or_else(|| self.issued.get(&id).map(|f| &f.handle))
            .or_else(|| self.acked.get(&id).map(|a| &a.handle))
            .map(|h| &h.key)
            .ok_or(Error::UnknownSubmission(id))
    }

    fn go_offline(&mut self) {
        // Outstanding writes can no longer be confirmed; their entries stay.
        self.queued.clear();
        self.issued.clear();
        self.acked.clear();
        self.transition(SyncState::Offline);
    }

    fn issue(&mut self, id: SubmissionId, handle: RollbackHandle) {
        self.issued.insert(
            id,
            InFlight {
                handle,
                clean_seen: false,
            },
        );
    }

    fn settle_acked(&mut self, up_to: u64) -> usize {
        let ids: Vec<SubmissionId> = self
            .acked
            .iter()
            .filter(|(_, a)| a.seq <= up_to)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(acked) = self.acked.remove(id) {
                self.ledger.settle(acked.handle);
            }
        }
        if !ids.is_empty() {
            tracing::debug!(
                document_id = %self.document_id,
                settled = ids.len(),
                "Optimistic entries confirmed"
            );
        }
        ids.len()
    }

    fn parse_snapshot(&self, fields: &Value) -> RemoteSnapshot {
        match RemoteSnapshot::from_fields(fields) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(document_id = %self.document_id, "Treating snapshot as empty: {}", e);
                RemoteSnapshot::default()
            }
        }
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            tracing::info!(document_id = %self.document_id, from = %self.state, to = %next, "Sync state changed");
            self.state = next;
        }
    }

    fn ledger_text(&self, key: &str) -> String {
        self.ledger
            .snapshot()
            .get(key)
            .map(|e| e.text.clone())
            .unwrap_or_default()
    }

    fn increment_for(&self, key: &str, text: String) -> IncrementField {
        IncrementField {
            document_id: self.document_id.clone(),
            key: key.to_string(),
            text,
            amount: 1,
        }
    }
}
