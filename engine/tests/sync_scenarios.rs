//! End-to-end scenarios for a client driving a session against a store.
//!
//! `ScriptedStore` wraps the in-memory store and injects failures, so the
//! offline and rollback paths run through the real async driver. A gated
//! store also holds each write in flight until the test releases it, with
//! another participant's write landing in between.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use wordcloud_engine::{
    DocumentId, DocumentStore, Error, IncrementField, MemoryDocumentStore, MemoryKeyValueStore,
    Session, SnapshotStream, StarterWord, SubmitStatus, SyncState, WidgetConfig, WordCloudClient,
};

type Client = WordCloudClient<ScriptedStore, MemoryKeyValueStore>;

#[derive(Default)]
struct ScriptedStore {
    inner: MemoryDocumentStore,
    fail_reads: Option<Error>,
    fail_increments: Mutex<Option<Error>>,
    close_subscriptions: bool,
    gated: bool,
    in_flight: Notify,
    release: Notify,
    reads: AtomicUsize,
    seeds: AtomicUsize,
    increments: AtomicUsize,
}

impl ScriptedStore {
    fn unreachable() -> Self {
        Self {
            fail_reads: Some(Error::unavailable("connection refused")),
            ..Self::default()
        }
    }

    async fn fail_increments_with(&self, error: Error) {
        *self.fail_increments.lock().await = Some(error);
    }

    fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
            + self.seeds.load(Ordering::SeqCst)
            + self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn get_once(&self, id: &DocumentId) -> wordcloud_engine::error::Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.fail_reads {
            return Err(e.clone());
        }
        self.inner.get_once(id).await
    }

    async fn set_if_absent(
        &self,
        id: &DocumentId,
        fields: Value,
    ) -> wordcloud_engine::error::Result<bool> {
        self.seeds.fetch_add(1, Ordering::SeqCst);
        self.inner.set_if_absent(id, fields).await
    }

    async fn subscribe(&self, id: &DocumentId) -> wordcloud_engine::error::Result<SnapshotStream> {
        let mut stream = self.inner.subscribe(id).await?;
        if !self.close_subscriptions {
            return Ok(stream);
        }
        // Forward the first snapshot, then close.
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(first) = stream.recv().await {
            tx.send(first).unwrap();
        }
        Ok(rx)
    }

    async fn increment(&self, op: IncrementField) -> wordcloud_engine::error::Result<()> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            let other = IncrementField {
                key: "calm".into(),
                text: "Calm".into(),
                ..op.clone()
            };
            self.inner.increment(other).await?;
            self.in_flight.notify_one();
            self.release.notified().await;
        }
        if let Some(e) = self.fail_increments.lock().await.clone() {
            return Err(e);
        }
        self.inner.increment(op).await
    }
}

fn config() -> WidgetConfig {
    WidgetConfig {
        prompt: "How do you feel about this lesson?".into(),
        starter_words: vec![StarterWord::new("Inspired", 2)],
        ..WidgetConfig::default()
    }
}

fn client(store: &Arc<ScriptedStore>, config: WidgetConfig) -> Client {
    WordCloudClient::new(Arc::clone(store), Session::new(config, MemoryKeyValueStore::new()))
}

async fn count_of(client: &Client, key: &str) -> Option<u64> {
    client
        .view()
        .await
        .words
        .into_iter()
        .find(|w| w.word.key == key)
        .map(|w| w.word.count)
}

async fn state_of(client: &Client) -> SyncState {
    client.with_session(|s| s.state()).await
}

#[tokio::test]
async fn unreachable_store_keeps_everything_local() {
    let store = Arc::new(ScriptedStore::unreachable());
    let client = client(&store, config());

    assert!(client.connect().await.is_none());
    assert_eq!(state_of(&client).await, SyncState::Offline);
    let calls_after_connect = store.calls();

    let outcome = client.submit("Great").await;
    assert_eq!(outcome.status(), SubmitStatus::Accepted);
    assert!(outcome.increment().is_none());

    let ledger = client
        .with_session(|s| s.synchronizer().ledger().snapshot())
        .await;
    assert_eq!(ledger["great"].text, "Great");
    assert_eq!(ledger["great"].count, 1);

    assert_eq!(count_of(&client, "great").await, Some(1));
    assert_eq!(count_of(&client, "inspired").await, Some(2));
    assert_eq!(store.calls(), calls_after_connect);
}

#[tokio::test]
async fn connected_submission_settles_into_remote() {
    let store = Arc::new(ScriptedStore::default());
    let client = client(&store, config());

    let mut stream = client.connect().await.expect("connected");
    assert_eq!(state_of(&client).await, SyncState::Connected);

    client.submit("Curious").await;
    // Visible before any snapshot confirms it.
    assert_eq!(count_of(&client, "curious").await, Some(1));

    client.drain(&mut stream).await;
    assert_eq!(count_of(&client, "curious").await, Some(1));
    assert!(client.with_session(|s| s.synchronizer().ledger().is_empty()).await);
    assert_eq!(client.with_session(|s| s.synchronizer().pending()).await, 0);
}

#[tokio::test]
async fn document_is_seeded_once_with_zero_counts() {
    let store = Arc::new(ScriptedStore::default());
    let first = client(&store, config());
    let mut first_stream = first.connect().await.expect("connected");
    first.submit("inspired!").await;
    first.drain(&mut first_stream).await;

    let id = first.with_session(|s| s.document_id().clone()).await;
    let document = store.inner.document(&id).await.expect("document created");
    assert_eq!(document.get("inspired").map(|e| e.count), Some(1));

    // Same authored widget, second participant: no overwrite.
    let second = client(&store, config());
    let mut second_stream = second.connect().await.expect("connected");
    second.drain(&mut second_stream).await;

    assert_eq!(store.seeds.load(Ordering::SeqCst), 1);
    assert_eq!(count_of(&second, "inspired").await, Some(3));
}

#[tokio::test]
async fn participants_converge_on_shared_counts() {
    let store = Arc::new(ScriptedStore::default());
    let alice = client(&store, config());
    let bob = client(&store, config());

    let mut alice_stream = alice.connect().await.expect("connected");
    let mut bob_stream = bob.connect().await.expect("connected");

    alice.submit("Calm").await;
    bob.submit("calm").await;
    bob.submit("Focused").await;

    alice.drain(&mut alice_stream).await;
    bob.drain(&mut bob_stream).await;

    for participant in [&alice, &bob] {
        assert_eq!(count_of(participant, "calm").await, Some(2));
        assert_eq!(count_of(participant, "focused").await, Some(1));
    }
    assert_eq!(alice.view().await.words, bob.view().await.words);
}

#[tokio::test]
async fn rejected_write_rolls_back_and_notifies() {
    let store = Arc::new(ScriptedStore::default());
    let client = client(&store, config());
    let _stream = client.connect().await.expect("connected");

    store.fail_increments_with(Error::rejected("permission denied")).await;
    let outcome = client.submit("Great").await;
    assert_eq!(outcome.status(), SubmitStatus::Accepted);

    assert_eq!(count_of(&client, "great").await, None);
    assert_eq!(state_of(&client).await, SyncState::Connected);
    assert_eq!(client.view().await.remaining, 2);
    let notice = client.with_session(|s| s.take_notice()).await;
    assert!(notice.is_some());
}

#[tokio::test]
async fn unavailable_write_goes_offline_and_stops_writing() {
    let store = Arc::new(ScriptedStore::default());
    let client = client(&store, config());
    let _stream = client.connect().await.expect("connected");

    store.fail_increments_with(Error::unavailable("socket reset")).await;
    client.submit("Great").await;

    assert_eq!(state_of(&client).await, SyncState::Offline);
    assert_eq!(count_of(&client, "great").await, Some(1));

    client.submit("Calm").await;
    assert_eq!(store.increments.load(Ordering::SeqCst), 1);
    assert_eq!(count_of(&client, "calm").await, Some(1));
}

#[tokio::test]
async fn submissions_before_connect_are_issued_on_connect() {
    let store = Arc::new(ScriptedStore::default());
    let client = client(&store, config());

    let early = client.submit("Early").await;
    assert!(early.increment().is_none());
    assert_eq!(state_of(&client).await, SyncState::Initializing);
    assert_eq!(count_of(&client, "early").await, Some(1));

    let mut stream = client.connect().await.expect("connected");
    client.drain(&mut stream).await;

    let id = client.with_session(|s| s.document_id().clone()).await;
    let document = store.inner.document(&id).await.expect("document");
    assert_eq!(document.get("early").map(|e| e.count), Some(1));
    assert_eq!(count_of(&client, "early").await, Some(1));
}

#[tokio::test]
async fn quota_blocks_after_cap() {
    let store = Arc::new(ScriptedStore::default());
    let config = WidgetConfig {
        max_entries_per_participant: 1,
        ..config()
    };
    let client = client(&store, config);
    let _stream = client.connect().await.expect("connected");

    assert_eq!(client.submit("one").await.status(), SubmitStatus::Accepted);
    assert_eq!(client.submit("two").await.status(), SubmitStatus::Limit);
    assert_eq!(store.increments.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn display_limit_applies_to_remote_words() {
    let store = Arc::new(ScriptedStore::default());
    let config = WidgetConfig {
        max_words_displayed: 10,
        starter_words: Vec::new(),
        ..config()
    };
    let client = client(&store, config);
    let id = client.with_session(|s| s.document_id().clone()).await;

    for i in 0..15u64 {
        store
            .inner
            .increment(IncrementField {
                document_id: id.clone(),
                key: format!("word-{:02}", i),
                text: format!("Word {:02}", i),
                amount: i + 1,
            })
            .await
            .unwrap();
    }

    let mut stream = client.connect().await.expect("connected");
    client.drain(&mut stream).await;

    let view = client.view().await;
    assert_eq!(view.words.len(), 10);
    assert_eq!(view.words[0].word.key, "word-14");
    assert_eq!(view.words[0].word.weight, 1.0);
    assert_eq!(view.words[9].word.key, "word-05");
}

#[tokio::test]
async fn closed_subscription_goes_offline() {
    let store = Arc::new(ScriptedStore {
        close_subscriptions: true,
        ..ScriptedStore::default()
    });
    let client = client(&store, config());
    let stream = client.connect().await.expect("connected");

    client.run_subscription(stream).await;
    assert_eq!(state_of(&client).await, SyncState::Offline);

    let outcome = client.submit("Later").await;
    assert!(outcome.increment().is_none());
    assert_eq!(count_of(&client, "later").await, Some(1));
}

fn gated() -> Arc<ScriptedStore> {
    Arc::new(ScriptedStore {
        gated: true,
        ..ScriptedStore::default()
    })
}

#[tokio::test]
async fn clean_snapshot_mid_flight_does_not_hide_unavailable_write() {
    let store = gated();
    let client = client(&store, config());
    let mut stream = client.connect().await.expect("connected");
    store.fail_increments_with(Error::unavailable("socket reset")).await;

    tokio::join!(client.submit("Great"), async {
        store.in_flight.notified().await;
        client.drain(&mut stream).await;
        assert_eq!(count_of(&client, "calm").await, Some(1));
        assert_eq!(count_of(&client, "great").await, Some(1));
        store.release.notify_one();
    });

    assert_eq!(state_of(&client).await, SyncState::Offline);
    assert_eq!(count_of(&client, "great").await, Some(1));

    client.submit("Focused").await;
    assert_eq!(store.increments.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn write_acknowledged_after_clean_snapshot_counts_once() {
    let store = gated();
    let client = client(&store, config());
    let mut stream = client.connect().await.expect("connected");

    tokio::join!(client.submit("Great"), async {
        store.in_flight.notified().await;
        client.drain(&mut stream).await;
        assert_eq!(count_of(&client, "great").await, Some(1));
        store.release.notify_one();
    });

    assert_eq!(state_of(&client).await, SyncState::Connected);
    assert_eq!(count_of(&client, "great").await, Some(1));

    client.drain(&mut stream).await;
    assert_eq!(count_of(&client, "great").await, Some(1));
    assert_eq!(count_of(&client, "calm").await, Some(1));
    assert!(client.with_session(|s| s.synchronizer().ledger().is_empty()).await);
    assert_eq!(client.with_session(|s| s.synchronizer().pending()).await, 0);
}
