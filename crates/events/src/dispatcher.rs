//! The synchronization dispatcher: feed pump, subscriptions, resync.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use firewatch_core::change::{ChangeEvent, Record, Table};
use firewatch_core::error::CoreError;
use firewatch_core::filter::{IncidentFilter, MessageFilter, Predicate, SortOrder};
use firewatch_core::retry::RetryPolicy;
use firewatch_core::types::EntityId;
use firewatch_db::{ChangeFeed, FeedSubscription, RecordStore, StoreError};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::delivery::Callback;
use crate::observer::{Observer, SubscriptionId};
use crate::shard::{shard_of, Registry, Shard, ShardCommand};

/// Tables the dispatcher follows.
const FEED_TABLES: [Table; 2] = [Table::Incidents, Table::ChatMessages];

/// Default number of shard workers.
pub const DEFAULT_SHARDS: usize = 8;

/// Default command buffer per shard.
pub const DEFAULT_SHARD_BUFFER: usize = 1024;

/// Floor on the resubscribe delay once the retry budget is spent.
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub shards: usize,
    pub shard_buffer: usize,
    /// Governs feed resubscription and resync queries.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            shard_buffer: DEFAULT_SHARD_BUFFER,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Sync dispatcher is shut down")]
    Stopped,
}

impl From<SyncError> for CoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(e) => e.into(),
            SyncError::Stopped => {
                CoreError::TransientStoreFailure("sync dispatcher is shut down".to_string())
            }
        }
    }
}

struct Inner {
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn ChangeFeed>,
    registry: Registry,
    shards: Vec<mpsc::Sender<ShardCommand>>,
    next_id: AtomicU64,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

/// Fans store changes out to observers.
///
/// Cheap to clone; all clones share one set of shards and observers.
#[derive(Clone)]
pub struct SyncDispatcher {
    inner: Arc<Inner>,
}

impl SyncDispatcher {
    /// Subscribe to the change feed and spawn the shard workers.
    ///
    /// Runs until `cancel` is cancelled.
    pub async fn start(
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn ChangeFeed>,
        config: SyncConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        let subscription = feed.subscribe(&FEED_TABLES).await?;

        let registry: Registry = Arc::default();
        let shard_count = config.shards.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let (tx, rx) = mpsc::channel(config.shard_buffer.max(1));
            let shard = Shard {
                index,
                shards: shard_count,
                registry: Arc::clone(&registry),
            };
            tokio::spawn(shard.run(rx, cancel.clone()));
            shards.push(tx);
        }

        let inner = Arc::new(Inner {
            store,
            feed,
            registry,
            shards,
            next_id: AtomicU64::new(1),
            retry: config.retry,
            cancel,
        });

        tracing::info!(shards = shard_count, "Sync dispatcher started");
        tokio::spawn(Arc::clone(&inner).run_feed(subscription));

        Ok(Self { inner })
    }

    /// Register an observer for `predicate`.
    ///
    /// The observer first receives every record currently matching, then
    /// live changes. Deliveries stop when the returned handle is dropped.
    pub async fn subscribe(
        &self,
        predicate: Predicate,
        callback: Callback,
    ) -> Result<SubscriptionHandle, SyncError> {
        if self.inner.cancel.is_cancelled() {
            return Err(SyncError::Stopped);
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let observer = Arc::new(Observer::new(id, predicate, callback, self.inner.shards.len()));
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&observer));

        // Registered before the snapshot query, so nothing committed after
        // the query can be missed.
        if let Err(e) = self.inner.sync_observer(&observer, false).await {
            self.inner.remove(id);
            return Err(e);
        }

        tracing::debug!(subscription = %id, table = %observer.table(), "Observer subscribed");
        Ok(SubscriptionHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        })
    }

    pub async fn subscribe_incidents(
        &self,
        filter: IncidentFilter,
        callback: Callback,
    ) -> Result<SubscriptionHandle, SyncError> {
        self.subscribe(Predicate::Incidents(filter), callback).await
    }

    pub async fn subscribe_messages(
        &self,
        incident_id: EntityId,
        callback: Callback,
    ) -> Result<SubscriptionHandle, SyncError> {
        self.subscribe(
            Predicate::Messages(MessageFilter::for_incident(incident_id)),
            callback,
        )
        .await
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop the feed pump and every shard.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    async fn run_feed(self: Arc<Self>, mut subscription: FeedSubscription) {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = subscription.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    if self.route(event).await.is_err() {
                        break;
                    }
                    continue;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Change feed interrupted, resynchronizing");
                }
                None => {
                    tracing::warn!("Change feed ended, resynchronizing");
                }
            }

            drop(subscription);
            subscription = match self.reconnect().await {
                Some(s) => s,
                None => break,
            };
            self.resync_all().await;
        }
        tracing::info!("Sync dispatcher stopped");
    }

    async fn route(&self, event: ChangeEvent) -> Result<(), SyncError> {
        let shard = shard_of(event.record.partition_key(), self.shards.len());
        self.shards[shard]
            .send(ShardCommand::Change(event))
            .await
            .map_err(|_| SyncError::Stopped)
    }

    /// Resubscribe to the feed, retrying until it works or we are cancelled.
    async fn reconnect(&self) -> Option<FeedSubscription> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match self.feed.subscribe(&FEED_TABLES).await {
                Ok(subscription) => {
                    tracing::info!(attempt, "Change feed resubscribed");
                    return Some(subscription);
                }
                Err(e) => {
                    let delay = if self.retry.should_retry(attempt) {
                        self.retry.delay_after(attempt)
                    } else {
                        if attempt == self.retry.attempts() {
                            tracing::error!(
                                attempt,
                                error = %e,
                                "Change feed resubscribe keeps failing",
                            );
                        }
                        self.retry.max_delay.max(MIN_RECONNECT_DELAY)
                    };
                    tracing::warn!(attempt, error = %e, "Change feed resubscribe failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn resync_all(&self) {
        let observers: Vec<Arc<Observer>> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        tracing::info!(observers = observers.len(), "Resynchronizing observers");
        for observer in observers {
            if !observer.is_active() {
                continue;
            }
            let mut attempt = 1;
            loop {
                match self.sync_observer(&observer, true).await {
                    Ok(()) => break,
                    Err(SyncError::Store(e)) if e.is_transient() && self.retry.should_retry(attempt) => {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        tracing::error!(subscription = %observer.id, error = %e, "Observer resync failed");
                        break;
                    }
                }
            }
        }
    }

    /// Query the observer's current result set and push it through the
    /// shards. With `expire`, members missing from the result are removed.
    async fn sync_observer(&self, observer: &Observer, expire: bool) -> Result<(), SyncError> {
        let epoch = observer.begin_snapshot();
        let result = self.send_snapshot(observer).await;

        let present = match &result {
            Ok(present) if expire => Some(Arc::clone(present)),
            _ => None,
        };
        for shard in &self.shards {
            shard
                .send(ShardCommand::SnapshotEnd {
                    subscription: observer.id,
                    epoch,
                    present: present.clone(),
                })
                .await
                .map_err(|_| SyncError::Stopped)?;
        }
        result.map(|_| ())
    }

    async fn send_snapshot(&self, observer: &Observer) -> Result<Arc<HashSet<EntityId>>, SyncError> {
        let records: Vec<Record> = match &observer.predicate {
            Predicate::Incidents(filter) => self
                .store
                .query_incidents(filter, SortOrder::Asc)
                .await?
                .into_iter()
                .map(Record::Incident)
                .collect(),
            Predicate::Messages(filter) => self
                .store
                .query_messages(filter, SortOrder::Asc)
                .await?
                .into_iter()
                .map(Record::Message)
                .collect(),
        };

        let present: Arc<HashSet<EntityId>> = Arc::new(records.iter().map(Record::id).collect());
        for record in records {
            let shard = shard_of(record.partition_key(), self.shards.len());
            self.shards[shard]
                .send(ShardCommand::Sync {
                    subscription: observer.id,
                    record,
                })
                .await
                .map_err(|_| SyncError::Stopped)?;
        }
        Ok(present)
    }

    fn remove(&self, id: SubscriptionId) {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(observer) = removed {
            observer.deactivate();
            tracing::debug!(subscription = %id, "Observer unsubscribed");
        }
    }
}

/// Keeps an observer registered. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    inner: Weak<Inner>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.id);
        }
    }
}
