//! Shard workers.
//!
//! Every change for one incident (the incident row and its messages) is
//! routed to the same shard, and a shard handles one command at a time, so
//! per-incident ordering holds for every observer.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use firewatch_core::change::{ChangeEvent, ChangeKind, Record};
use firewatch_core::types::EntityId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::observer::{Observer, SubscriptionId};

pub(crate) type Registry = Arc<RwLock<HashMap<SubscriptionId, Arc<Observer>>>>;

pub(crate) enum ShardCommand {
    /// A live change from the feed.
    Change(ChangeEvent),
    /// A snapshot record for one observer (initial sync or resync).
    Sync {
        subscription: SubscriptionId,
        record: Record,
    },
    /// End of a snapshot for one observer, sent to every shard after the
    /// snapshot's records whether or not the query succeeded.
    SnapshotEnd {
        subscription: SubscriptionId,
        epoch: u64,
        /// Ids the snapshot returned, when members missing from it are to be
        /// removed.
        present: Option<Arc<HashSet<EntityId>>>,
    },
}

/// Shard index for a partition key.
pub(crate) fn shard_of(partition: EntityId, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    partition.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

pub(crate) struct Shard {
    pub index: usize,
    pub shards: usize,
    pub registry: Registry,
}

impl Shard {
    pub async fn run(self, mut rx: mpsc::Receiver<ShardCommand>, cancel: CancellationToken) {
        tracing::debug!(shard = self.index, "Sync shard started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        tracing::debug!(shard = self.index, "Sync shard stopped");
    }

    fn handle(&self, command: ShardCommand) {
        match command {
            ShardCommand::Change(event) => {
                let deleted = event.kind == ChangeKind::Delete;
                let table = event.record.table();
                for observer in self.observers() {
                    if observer.table() != table {
                        continue;
                    }
                    if let Some(delivery) = observer.offer(&event.record, deleted, self.index) {
                        observer.deliver(delivery);
                    }
                }
            }
            ShardCommand::Sync {
                subscription,
                record,
            } => {
                if let Some(observer) = self.observer(subscription) {
                    if let Some(delivery) = observer.offer(&record, false, self.index) {
                        observer.deliver(delivery);
                    }
                }
            }
            ShardCommand::SnapshotEnd {
                subscription,
                epoch,
                present,
            } => {
                if let Some(observer) = self.observer(subscription) {
                    let (index, shards) = (self.index, self.shards);
                    let owned = |p| shard_of(p, shards) == index;
                    if let Some(present) = present {
                        for delivery in observer.expire(&present, epoch, owned) {
                            observer.deliver(delivery);
                        }
                    }
                    observer.end_snapshot(index, owned);
                }
            }
        }
    }

    fn observers(&self) -> Vec<Arc<Observer>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.values().cloned().collect()
    }

    fn observer(&self, id: SubscriptionId) -> Option<Arc<Observer>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_is_stable_and_in_range() {
        let id = uuid::Uuid::new_v4();
        let first = shard_of(id, 8);
        assert!(first < 8);
        assert_eq!(shard_of(id, 8), first);
        assert_eq!(shard_of(id, 0), 0);
    }
}
