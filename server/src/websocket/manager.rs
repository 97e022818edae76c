//! WebSocket subscription manager.
//!
//! Tracks which connection watches which document and fans snapshots out
//! to every subscriber of a document.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use wordcloud_engine::DocumentId;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Unique identifier for this connection
    pub id: String,
    /// Document being watched
    pub document_id: DocumentId,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// Manages active subscriptions.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// All active subscriptions, keyed by connection ID.
    subscriptions: DashMap<String, Subscription>,
    /// Connection IDs per document.
    by_document: DashMap<DocumentId, Vec<String>>,
    /// Highest revision published per document.
    published: DashMap<DocumentId, i64>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a subscription. Returns the connection ID.
    pub fn register(&self, document_id: DocumentId, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.by_document
            .entry(document_id.clone())
            .or_default()
            .push(conn_id.clone());
        self.subscriptions.insert(
            conn_id.clone(),
            Subscription {
                id: conn_id.clone(),
                document_id: document_id.clone(),
                sender,
            },
        );

        tracing::info!(conn_id = %conn_id, document_id = %document_id, "Subscription registered");

        conn_id
    }

    /// Remove a subscription.
    pub fn unregister(&self, conn_id: &str) {
        let Some((_, sub)) = self.subscriptions.remove(conn_id) else {
            return;
        };

        if let Some(mut conn_ids) = self.by_document.get_mut(&sub.document_id) {
            conn_ids.retain(|id| id != conn_id);
            if conn_ids.is_empty() {
                drop(conn_ids);
                self.by_document.remove(&sub.document_id);
                self.published.remove(&sub.document_id);
            }
        }

        tracing::info!(conn_id = %conn_id, document_id = %sub.document_id, "Subscription removed");
    }

    /// Send a snapshot to every subscriber of its document.
    ///
    /// Snapshots older than one already published are dropped, so
    /// subscribers never see a document go backwards. Returns the number
    /// of subscribers that received it.
    pub fn publish(
        &self,
        document_id: &DocumentId,
        revision: i64,
        message: ServerMessage,
    ) -> usize {
        // Held while sending, so concurrent publishers cannot interleave.
        let mut last = self.published.entry(document_id.clone()).or_insert(i64::MIN);
        if revision <= *last {
            tracing::debug!(document_id = %document_id, revision, last = *last, "Dropping stale snapshot");
            return 0;
        }
        *last = revision;

        let conn_ids = match self.by_document.get(document_id) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        let mut sent_count = 0;
        for conn_id in conn_ids {
            if self.send_to(&conn_id, message.clone()) {
                sent_count += 1;
            }
        }

        tracing::debug!(document_id = %document_id, revision, recipients = sent_count, "Published snapshot");

        sent_count
    }

    /// Send the snapshot read when a connection subscribed.
    ///
    /// Skipped if a newer revision was already published, since the
    /// subscriber received that one.
    pub fn send_initial(&self, conn_id: &str, revision: i64, message: ServerMessage) -> bool {
        let document_id = self.subscriptions.get(conn_id).map(|s| s.document_id.clone());
        let Some(document_id) = document_id else {
            return false;
        };
        let newer = self
            .published
            .get(&document_id)
            .is_some_and(|last| *last > revision);
        if newer {
            return false;
        }
        self.send_to(conn_id, message)
    }

    /// Send a message to one connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.subscriptions.get(conn_id) {
            Some(sub) => sub.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Number of subscribers watching a document.
    pub fn subscriber_count(&self, document_id: &DocumentId) -> usize {
        self.by_document.get(document_id).map_or(0, |ids| ids.len())
    }

    /// Number of active subscriptions.
    pub fn connection_count(&self) -> usize {
        self.subscriptions.len()
    }
}
