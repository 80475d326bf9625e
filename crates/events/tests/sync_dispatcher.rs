use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use firewatch_core::change::{ChangeEvent, Record, Table};
use firewatch_core::chat::NewChatMessage;
use firewatch_core::filter::IncidentFilter;
use firewatch_core::incident::{Incident, IncidentStatus};
use firewatch_core::lifecycle::next_updated_at;
use firewatch_core::retry::RetryPolicy;
use firewatch_db::{
    ChangeFeed, FeedError, FeedSubscription, MemoryStore, RecordStore, StoreError, StoreResult,
};
use firewatch_events::{Callback, Delivery, SyncConfig, SyncDispatcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(2);

fn config() -> SyncConfig {
    SyncConfig {
        shards: 4,
        shard_buffer: 64,
        retry: RetryPolicy::immediate(3),
    }
}

fn collector() -> (Callback, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Callback = Arc::new(move |delivery| {
        let _ = tx.send(delivery);
    });
    (callback, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("delivery channel closed")
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Delivery>) {
    let extra = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(extra.is_err(), "unexpected delivery: {extra:?}");
}

fn incident(status: IncidentStatus) -> Incident {
    let now = Utc::now();
    let dispatcher_id = status.requires_dispatcher().then(Uuid::new_v4);
    Incident {
        id: Uuid::new_v4(),
        status,
        reported_by: Uuid::new_v4(),
        dispatcher_id,
        station_id: None,
        incident_type: "fire".into(),
        description: "Structure fire".into(),
        priority: "critical".into(),
        location: "51.5072,-0.1276".into(),
        media_urls: vec![],
        created_at: now,
        updated_at: now,
    }
}

fn moved(i: &Incident, status: IncidentStatus) -> Incident {
    let mut next = i.clone();
    next.status = status;
    if status.requires_dispatcher() && next.dispatcher_id.is_none() {
        next.dispatcher_id = Some(Uuid::new_v4());
    }
    next.updated_at = next_updated_at(i.updated_at, Utc::now());
    next
}

fn in_progress() -> IncidentFilter {
    IncidentFilter::any().with_status(IncidentStatus::InProgress)
}

async fn start(store: Arc<MemoryStore>) -> SyncDispatcher {
    SyncDispatcher::start(store.clone(), store, config(), CancellationToken::new())
        .await
        .unwrap()
}

/// A change feed whose streams are fed by the test.
///
/// Each `subscribe` consumes the next queued stream; with none left it
/// fails transiently.
#[derive(Default)]
struct ScriptedFeed {
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<ChangeEvent, FeedError>>>>,
}

impl ScriptedFeed {
    fn push_stream(&self) -> mpsc::UnboundedSender<Result<ChangeEvent, FeedError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn subscribe(&self, _tables: &[Table]) -> StoreResult<FeedSubscription> {
        let rx = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| StoreError::Transient("no scripted stream".into()))?;
        Ok(FeedSubscription::new(futures::stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|item| (item, rx)) },
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initial_snapshot_then_live_changes() {
    let store = Arc::new(MemoryStore::new());
    let existing = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();
    store
        .insert_incident(&incident(IncidentStatus::Pending))
        .await
        .unwrap();

    let sync = start(store.clone()).await;
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_incidents(in_progress(), callback).await.unwrap();

    assert_matches!(next(&mut rx).await, Delivery::Upsert(Record::Incident(i)) if i.id == existing.id);

    let live = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();
    assert_matches!(next(&mut rx).await, Delivery::Upsert(Record::Incident(i)) if i.id == live.id);
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn resolved_incident_is_removed_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let sync = start(store.clone()).await;
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_incidents(in_progress(), callback).await.unwrap();

    let pending = store
        .insert_incident(&incident(IncidentStatus::Pending))
        .await
        .unwrap();
    let active = store
        .update_incident(&moved(&pending, IncidentStatus::InProgress), IncidentStatus::Pending)
        .await
        .unwrap();
    assert_matches!(next(&mut rx).await, Delivery::Upsert(Record::Incident(i)) if i.status == IncidentStatus::InProgress);

    store
        .update_incident(&moved(&active, IncidentStatus::Resolved), IncidentStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(
        next(&mut rx).await,
        Delivery::Remove {
            table: Table::Incidents,
            id: pending.id
        }
    );
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn duplicate_and_stale_events_are_dropped() {
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ScriptedFeed::default());
    let tx = feed.push_stream();
    let sync = SyncDispatcher::start(store, feed, config(), CancellationToken::new())
        .await
        .unwrap();
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_incidents(in_progress(), callback).await.unwrap();

    let v1 = incident(IncidentStatus::InProgress);
    let mut v2 = v1.clone();
    v2.priority = "low".into();
    v2.updated_at = v1.updated_at + chrono::Duration::seconds(1);

    tx.send(Ok(ChangeEvent::update(Record::Incident(v2.clone())))).unwrap();
    tx.send(Ok(ChangeEvent::update(Record::Incident(v2.clone())))).unwrap();
    tx.send(Ok(ChangeEvent::insert(Record::Incident(v1)))).unwrap();

    assert_matches!(next(&mut rx).await, Delivery::Upsert(Record::Incident(i)) if i.priority == "low");
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn messages_arrive_in_creation_order() {
    let store = Arc::new(MemoryStore::new());
    let parent = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();
    let sync = start(store.clone()).await;
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_messages(parent.id, callback).await.unwrap();

    for n in 0..25 {
        store
            .insert_message(&NewChatMessage {
                incident_id: parent.id,
                sender_id: parent.reported_by,
                message: format!("update {n}"),
            })
            .await
            .unwrap();
    }

    let mut last = None;
    for n in 0..25 {
        let Delivery::Upsert(Record::Message(m)) = next(&mut rx).await else {
            panic!("expected a message upsert");
        };
        assert_eq!(m.message, format!("update {n}"));
        if let Some(prev) = last {
            assert!(m.created_at > prev);
        }
        last = Some(m.created_at);
    }
}

#[tokio::test]
async fn messages_of_other_incidents_are_not_delivered() {
    let store = Arc::new(MemoryStore::new());
    let mine = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();
    let other = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();
    let sync = start(store.clone()).await;
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_messages(mine.id, callback).await.unwrap();

    store
        .insert_message(&NewChatMessage {
            incident_id: other.id,
            sender_id: other.reported_by,
            message: "elsewhere".into(),
        })
        .await
        .unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn unsubscribe_only_affects_that_observer() {
    let store = Arc::new(MemoryStore::new());
    let sync = start(store.clone()).await;
    let (cb_a, mut rx_a) = collector();
    let (cb_b, mut rx_b) = collector();
    let handle_a = sync.subscribe_incidents(IncidentFilter::any(), cb_a).await.unwrap();
    let _handle_b = sync.subscribe_incidents(IncidentFilter::any(), cb_b).await.unwrap();
    assert_eq!(sync.observer_count(), 2);

    handle_a.unsubscribe();
    assert_eq!(sync.observer_count(), 1);

    store
        .insert_incident(&incident(IncidentStatus::Pending))
        .await
        .unwrap();
    assert_matches!(next(&mut rx_b).await, Delivery::Upsert(_));
    assert_quiet(&mut rx_a).await;
}

#[tokio::test]
async fn deleted_incident_is_removed() {
    let store = Arc::new(MemoryStore::new());
    let doomed = store
        .insert_incident(&incident(IncidentStatus::Pending))
        .await
        .unwrap();
    let sync = start(store.clone()).await;
    let (callback, mut rx) = collector();
    let _handle = sync
        .subscribe_incidents(IncidentFilter::any(), callback)
        .await
        .unwrap();
    assert_matches!(next(&mut rx).await, Delivery::Upsert(_));

    store.delete_incident(doomed.id).await.unwrap();
    assert_eq!(
        next(&mut rx).await,
        Delivery::Remove {
            table: Table::Incidents,
            id: doomed.id
        }
    );
}

#[tokio::test]
async fn disconnect_triggers_full_resync() {
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ScriptedFeed::default());
    let first = feed.push_stream();
    let _second = feed.push_stream();
    let sync = SyncDispatcher::start(store.clone(), feed, config(), CancellationToken::new())
        .await
        .unwrap();
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_incidents(in_progress(), callback).await.unwrap();

    // Seen live, then changed in the store while the feed is down.
    let active = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();
    first
        .send(Ok(ChangeEvent::insert(Record::Incident(active.clone()))))
        .unwrap();
    assert_matches!(next(&mut rx).await, Delivery::Upsert(_));

    store
        .update_incident(&moved(&active, IncidentStatus::Cancelled), IncidentStatus::InProgress)
        .await
        .unwrap();
    let missed = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();

    first
        .send(Err(FeedError::Disconnected("connection reset".into())))
        .unwrap();

    let mut got = vec![next(&mut rx).await, next(&mut rx).await];
    got.sort_by_key(|d| d.is_remove());
    assert_matches!(&got[0], Delivery::Upsert(Record::Incident(i)) if i.id == missed.id);
    assert_eq!(
        got[1],
        Delivery::Remove {
            table: Table::Incidents,
            id: active.id
        }
    );
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn memory_feed_disconnect_recovers() {
    let store = Arc::new(MemoryStore::new());
    let sync = start(store.clone()).await;
    let (callback, mut rx) = collector();
    let _handle = sync.subscribe_incidents(in_progress(), callback).await.unwrap();

    store.disconnect_feeds();
    let created = store
        .insert_incident(&incident(IncidentStatus::InProgress))
        .await
        .unwrap();

    // Delivered either live or by the resync; never twice.
    assert_matches!(next(&mut rx).await, Delivery::Upsert(Record::Incident(i)) if i.id == created.id);
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn subscribe_after_shutdown_fails() {
    let store = Arc::new(MemoryStore::new());
    let sync = start(store).await;
    sync.shutdown();
    let (callback, _rx) = collector();
    assert!(sync
        .subscribe_incidents(IncidentFilter::any(), callback)
        .await
        .is_err());
}
