//! The realtime document store capability.
//!
//! The engine never talks to a concrete store. It consumes the
//! [`DocumentStore`] trait: read once, create if absent, subscribe to
//! snapshots, and increment a single word's counter. Increments are pure
//! counter additions, so concurrent writers commute at the store.
//!
//! [`MemoryDocumentStore`] implements the trait in process memory for
//! previews and tests.

use crate::{
    error::Result,
    snapshot::RemoteSnapshot,
    word::WordEntry,
    DocumentId, Error, WordKey,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};

/// Increment one word's counter and refresh its display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementField {
    pub document_id: DocumentId,
    pub key: WordKey,
    pub text: String,
    pub amount: u64,
}

/// One snapshot delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEvent {
    /// Raw document fields
    pub fields: Value,
    /// Whether this client still has writes the store has not merged.
    /// `None` when the store does not say.
    #[serde(default)]
    pub has_pending_local_writes: Option<bool>,
}

impl SnapshotEvent {
    pub fn new(fields: Value, has_pending_local_writes: Option<bool>) -> Self {
        Self {
            fields,
            has_pending_local_writes,
        }
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub type SnapshotStream = mpsc::UnboundedReceiver<SnapshotEvent>;

/// Realtime document store used by the synchronizer.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document once. `None` if it does not exist.
    async fn get_once(&self, id: &DocumentId) -> Result<Option<Value>>;

    /// Create a document unless it exists. Returns whether it was created.
    async fn set_if_absent(&self, id: &DocumentId, fields: Value) -> Result<bool>;

    /// Subscribe to snapshots of a document.
    async fn subscribe(&self, id: &DocumentId) -> Result<SnapshotStream>;

    /// Add to one word's counter.
    async fn increment(&self, op: IncrementField) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: HashMap<DocumentId, RemoteSnapshot>,
    subscribers: HashMap<DocumentId, Vec<mpsc::UnboundedSender<SnapshotEvent>>>,
}

impl MemoryInner {
    fn publish(&mut self, id: &DocumentId) {
        let fields = self
            .documents
            .get(id)
            .map_or_else(|| json!({}), RemoteSnapshot::to_fields);
        if let Some(senders) = self.subscribers.get_mut(id) {
            senders.retain(|tx| tx.send(SnapshotEvent::new(fields.clone(), Some(false))).is_ok());
        }
    }
}

/// In-process [`DocumentStore`].
///
/// Writes apply immediately, so every snapshot it sends reports no
/// pending local writes.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of a document.
    pub async fn document(&self, id: &DocumentId) -> Option<RemoteSnapshot> {
        self.inner.lock().await.documents.get(id).cloned()
    }

    /// Number of live subscriptions to a document.
    pub async fn subscriber_count(&self, id: &DocumentId) -> usize {
        let mut inner = self.inner.lock().await;
        match inner.subscribers.get_mut(id) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_once(&self, id: &DocumentId) -> Result<Option<Value>> {
        let inner = self.inner.lock().await;
        Ok(inner.documents.get(id).map(RemoteSnapshot::to_fields))
    }

    async fn set_if_absent(&self, id: &DocumentId, fields: Value) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.documents.contains_key(id) {
            return Ok(false);
        }
        let snapshot =
            RemoteSnapshot::from_fields(&fields).map_err(|e| Error::rejected(e.to_string()))?;
        inner.documents.insert(id.clone(), snapshot);
        inner.publish(id);
        Ok(true)
    }

    async fn subscribe(&self, id: &DocumentId) -> Result<SnapshotStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        let fields = inner
            .documents
            .get(id)
            .map_or_else(|| json!({}), RemoteSnapshot::to_fields);
        // Receiver is still in hand, so this cannot fail.
        let _ = tx.send(SnapshotEvent::new(fields, Some(false)));
        inner.subscribers.entry(id.clone()).or_default().push(tx);
        Ok(rx)
    }

    async fn increment(&self, op: IncrementField) -> Result<()> {
        if op.amount == 0 {
            return Err(Error::rejected("increment amount must be positive"));
        }
        if op.key.is_empty() {
            return Err(Error::InvalidKey(op.key));
        }

        let mut inner = self.inner.lock().await;
        let document = inner.documents.entry(op.document_id.clone()).or_default();
        let entry = document
            .words
            .entry(op.key)
            .or_insert_with(|| WordEntry::new("", 0));
        entry.count = entry.count.saturating_add(op.amount);
        if !op.text.is_empty() {
            entry.text = op.text;
        }
        inner.publish(&op.document_id);
        Ok(())
    }
}
