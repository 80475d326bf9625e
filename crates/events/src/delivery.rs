//! What observers receive.

use std::sync::Arc;

use firewatch_core::change::{Record, Table};
use firewatch_core::types::EntityId;
use serde::Serialize;

/// A change delivered to one observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    /// The record (new or changed) is in the observer's result set.
    Upsert(Record),
    /// The record left the observer's result set, or was deleted.
    Remove { table: Table, id: EntityId },
}

impl Delivery {
    pub fn id(&self) -> EntityId {
        match self {
            Delivery::Upsert(record) => record.id(),
            Delivery::Remove { id, .. } => *id,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Delivery::Remove { .. })
    }
}

/// Observer callback. Runs on a shard task and must not block.
pub type Callback = Arc<dyn Fn(Delivery) + Send + Sync>;
