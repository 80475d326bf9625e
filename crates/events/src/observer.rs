//! One registered observer and its delivery bookkeeping.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use firewatch_core::change::{Record, Table};
use firewatch_core::filter::Predicate;
use firewatch_core::types::{EntityId, Timestamp};

use crate::delivery::{Callback, Delivery};

/// Identifies a subscription within one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Last version of a record this observer has processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mark {
    pub version: Timestamp,
    /// Whether the record is currently in the observer's result set.
    pub member: bool,
    /// The record was deleted at `version`.
    pub tombstone: bool,
    pub partition: EntityId,
    /// Snapshot epoch current when the mark was written.
    pub epoch: u64,
}

/// Per-observer delivery state.
///
/// Marks are held for current members. Marks for anything else are only
/// needed while a snapshot query is in flight, since only a snapshot can
/// replay a version older than one already processed. They are dropped as
/// soon as no snapshot is open on the owning shard.
pub(crate) struct Observer {
    pub id: SubscriptionId,
    pub predicate: Predicate,
    callback: Callback,
    active: AtomicBool,
    marks: Mutex<HashMap<EntityId, Mark>>,
    epoch: AtomicU64,
    /// Snapshots begun but not yet ended, per shard.
    open: Box<[AtomicUsize]>,
}

impl Observer {
    pub fn new(id: SubscriptionId, predicate: Predicate, callback: Callback, shards: usize) -> Self {
        Self {
            id,
            predicate,
            callback,
            active: AtomicBool::new(true),
            marks: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            open: (0..shards.max(1)).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn table(&self) -> Table {
        self.predicate.table()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Open a snapshot on every shard and return its epoch.
    ///
    /// Must be called before the snapshot query runs. Every mark written
    /// after this call carries an epoch at or above the returned one.
    pub fn begin_snapshot(&self) -> u64 {
        for open in self.open.iter() {
            open.fetch_add(1, Ordering::SeqCst);
        }
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Close one snapshot on `shard`. When none remain open there, marks of
    /// non-members in that shard's partitions are discarded.
    pub fn end_snapshot(&self, shard: usize, mut partition_filter: impl FnMut(EntityId) -> bool) {
        let Some(open) = self.open.get(shard) else {
            return;
        };
        let previous = open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or_default();
        if previous <= 1 {
            let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
            marks.retain(|_, mark| mark.member || !partition_filter(mark.partition));
        }
    }

    fn snapshot_open(&self, shard: usize) -> bool {
        self.open
            .get(shard)
            .is_some_and(|open| open.load(Ordering::SeqCst) > 0)
    }

    /// Decide what, if anything, `record` means for this observer.
    ///
    /// Anything at or below the recorded version is dropped, except that a
    /// delete may land on the version it deletes. While a snapshot is open
    /// on `shard`, non-member versions are remembered too, so the snapshot
    /// can never resurrect a record that has since left the result set.
    pub fn offer(&self, record: &Record, deleted: bool, shard: usize) -> Option<Delivery> {
        let version = record.version();
        let id = record.id();
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = marks.get(&id).copied();
        if let Some(mark) = previous {
            let stale = if mark.tombstone || !deleted {
                version <= mark.version
            } else {
                version < mark.version
            };
            if stale {
                return None;
            }
        }

        let was_member = previous.is_some_and(|m| m.member);
        let member = !deleted && self.predicate.matches(record);
        if member || self.snapshot_open(shard) {
            marks.insert(
                id,
                Mark {
                    version,
                    member,
                    tombstone: deleted,
                    partition: record.partition_key(),
                    epoch: self.epoch.load(Ordering::SeqCst),
                },
            );
        } else {
            marks.remove(&id);
        }

        if member {
            Some(Delivery::Upsert(record.clone()))
        } else if was_member {
            Some(Delivery::Remove {
                table: record.table(),
                id,
            })
        } else {
            None
        }
    }

    /// Remove members of `partition_filter`'s partitions that the snapshot
    /// opened at `epoch` no longer contains.
    ///
    /// Marks written after the snapshot began came from live events the
    /// query may not have seen, and are kept.
    pub fn expire(
        &self,
        present: &HashSet<EntityId>,
        epoch: u64,
        mut partition_filter: impl FnMut(EntityId) -> bool,
    ) -> Vec<Delivery> {
        let table = self.table();
        let mut marks = self.marks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = Vec::new();
        for (id, mark) in marks.iter_mut() {
            if mark.member
                && mark.epoch < epoch
                && !present.contains(id)
                && partition_filter(mark.partition)
            {
                mark.member = false;
                removed.push(Delivery::Remove { table, id: *id });
            }
        }
        removed
    }

    /// Hand a delivery to the observer's callback if it is still subscribed.
    pub fn deliver(&self, delivery: Delivery) {
        if self.is_active() {
            (self.callback)(delivery);
        }
    }

    #[cfg(test)]
    fn mark_count(&self) -> usize {
        self.marks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
