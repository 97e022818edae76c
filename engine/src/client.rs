//! Async driver connecting a [`Session`] to a [`DocumentStore`].
//!
//! The session lock is never held across a store call. Local steps finish
//! and release the lock before a write goes out, so a concurrent
//! [`WordCloudClient::view`] already sees the optimistic state while the
//! write is in flight.
//!
//! ```rust
//! use std::sync::Arc;
//! use wordcloud_engine::{
//!     MemoryDocumentStore, MemoryKeyValueStore, Session, WidgetConfig, WordCloudClient,
//! };
//!
//! # tokio_test_runtime(async {
//! let store = Arc::new(MemoryDocumentStore::new());
//! let session = Session::new(WidgetConfig::default(), MemoryKeyValueStore::new());
//! let client = WordCloudClient::new(store, session);
//!
//! let mut stream = client.connect().await.expect("memory store is always up");
//! client.submit("Curious").await;
//! client.drain(&mut stream).await;
//!
//! let view = client.view().await;
//! assert_eq!(view.words[0].word.count, 1);
//! # });
//! # fn tokio_test_runtime(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use crate::{
    error::Result,
    quota::KeyValueStore,
    session::{CloudView, Session, SubmitOutcome},
    store::{DocumentStore, IncrementField, SnapshotStream},
    sync::{AckOutcome, ReadToken},
    DocumentId, SubmissionId,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Drives one session against a document store.
pub struct WordCloudClient<S, K> {
    store: Arc<S>,
    session: Arc<Mutex<Session<K>>>,
}

impl<S, K> Clone for WordCloudClient<S, K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: Arc::clone(&self.session),
        }
    }
}

impl<S: DocumentStore, K: KeyValueStore> WordCloudClient<S, K> {
    pub fn new(store: Arc<S>, session: Session<K>) -> Self {
        Self {
            store,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Initialize against the store.
    ///
    /// Creates the document from the seed if it does not exist, then
    /// subscribes. On failure the session goes offline and `None` is
    /// returned; nothing is surfaced to the participant.
    pub async fn connect(&self) -> Option<SnapshotStream> {
        let (document_id, initial_fields) = {
            let session = self.session.lock().await;
            (session.document_id().clone(), session.initial_fields())
        };

        match self.initialize(&document_id, initial_fields).await {
            Ok(stream) => {
                let writes = self.session.lock().await.initialized();
                for (id, op) in writes {
                    self.dispatch(id, op).await;
                }
                Some(stream)
            }
            Err(e) => {
                self.session.lock().await.initialization_failed(&e);
                None
            }
        }
    }

    async fn initialize(&self, id: &DocumentId, initial_fields: Value) -> Result<SnapshotStream> {
        if self.store.get_once(id).await?.is_none() {
            let created = self.store.set_if_absent(id, initial_fields).await?;
            tracing::debug!(document_id = %id, created, "Seeded absent document");
        }
        self.store.subscribe(id).await
    }

    /// Submit raw input.
    ///
    /// The optimistic state is visible as soon as the local steps finish;
    /// this future then waits for the store's verdict on the write.
    pub async fn submit(&self, raw: &str) -> SubmitOutcome {
        let outcome = self.session.lock().await.submit(raw);
        if let Some((id, op)) = outcome.increment() {
            self.dispatch(id, op).await;
        }
        outcome
    }

    async fn dispatch(&self, id: SubmissionId, op: IncrementField) {
        let document_id = op.document_id.clone();
        let result = self.store.increment(op).await;
        let ack = {
            let mut session = self.session.lock().await;
            match result {
                Ok(()) => session.submission_succeeded(id),
                Err(e) => {
                    session.submission_failed(id, &e);
                    return;
                }
            }
        };

        if let AckOutcome::NeedsRead(token) = ack {
            self.confirm(&document_id, token).await;
        }
    }

    /// Read the document once to settle writes acknowledged after the last
    /// clean snapshot. On failure they stay pending for the next snapshot.
    async fn confirm(&self, id: &DocumentId, token: ReadToken) {
        match self.store.get_once(id).await {
            Ok(fields) => {
                let fields = fields.unwrap_or_else(|| Value::Object(Default::default()));
                self.session.lock().await.apply_confirmed_read(&fields, token);
            }
            Err(e) => tracing::debug!(document_id = %id, "Confirming read failed: {}", e),
        }
    }

    /// Apply snapshots until the subscription closes, then go offline.
    pub async fn run_subscription(&self, mut stream: SnapshotStream) {
        while let Some(event) = stream.recv().await {
            self.session.lock().await.apply_snapshot(&event);
        }
        self.session.lock().await.subscription_lost("subscription closed");
    }

    /// Apply every snapshot already waiting on the stream.
    pub async fn drain(&self, stream: &mut SnapshotStream) -> usize {
        let mut applied = 0;
        while let Ok(event) = stream.try_recv() {
            self.session.lock().await.apply_snapshot(&event);
            applied += 1;
        }
        applied
    }

    pub async fn view(&self) -> CloudView {
        self.session.lock().await.view()
    }

    /// Run a closure against the session.
    pub async fn with_session<R>(&self, f: impl FnOnce(&mut Session<K>) -> R) -> R {
        let mut session = self.session.lock().await;
        f(&mut session)
    }
}
