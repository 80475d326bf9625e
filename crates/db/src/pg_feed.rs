//! [`ChangeFeed`] over PostgreSQL `LISTEN/NOTIFY`.
//!
//! The `notify_row_change` trigger publishes `{table, kind, id}` for inserts
//! and updates and `{table, kind, id, row}` for deletes on the
//! `firewatch_changes` channel. Inserts and updates are re-read by id so the
//! event carries the full committed row.

use async_trait::async_trait;
use firewatch_core::change::{ChangeEvent, ChangeKind, Record, Table};
use firewatch_core::chat::ChatMessage;
use firewatch_core::incident::Incident;
use firewatch_core::types::EntityId;
use serde::Deserialize;
use sqlx::postgres::PgListener;

use crate::error::{StoreError, StoreResult};
use crate::feed::{ChangeFeed, FeedError, FeedSubscription};
use crate::models::chat_message::ChatMessageRow;
use crate::models::incident::IncidentRow;
use crate::repositories::{ChatMessageRepo, IncidentRepo};
use crate::DbPool;

/// Notification channel written by the `notify_row_change` trigger.
pub const CHANGE_CHANNEL: &str = "firewatch_changes";

#[derive(Clone)]
pub struct PgChangeFeed {
    pool: DbPool,
}

impl PgChangeFeed {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    table: Table,
    kind: ChangeKind,
    id: EntityId,
    #[serde(default)]
    row: Option<serde_json::Value>,
}

struct ListenState {
    listener: PgListener,
    pool: DbPool,
    tables: Vec<Table>,
    closed: bool,
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, tables: &[Table]) -> StoreResult<FeedSubscription> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::debug!(channel = CHANGE_CHANNEL, ?tables, "Change feed subscribed");

        let state = ListenState {
            listener,
            pool: self.pool.clone(),
            tables: tables.to_vec(),
            closed: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.closed {
                return None;
            }
            let item = next_event(&mut state).await;
            if item.is_err() {
                // The listener may have silently dropped notifications; end
                // the stream so the consumer resubscribes and resyncs.
                state.closed = true;
            }
            Some((item, state))
        });

        Ok(FeedSubscription::new(stream))
    }
}

/// Wait for the next notification that maps to an event for `state.tables`.
async fn next_event(state: &mut ListenState) -> Result<ChangeEvent, FeedError> {
    loop {
        let notification = match state.listener.try_recv().await {
            Ok(Some(n)) => n,
            Ok(None) => {
                return Err(FeedError::Disconnected(
                    "listener connection lost".to_string(),
                ))
            }
            Err(e) => return Err(FeedError::Disconnected(e.to_string())),
        };

        let parsed: Notification = match serde_json::from_str(notification.payload()) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, payload = notification.payload(), "Ignoring malformed change notification");
                continue;
            }
        };

        if !state.tables.contains(&parsed.table) {
            continue;
        }

        match resolve(&state.pool, parsed).await {
            Ok(Some(event)) => return Ok(event),
            // Row already gone; its delete notification follows.
            Ok(None) => continue,
            Err(e) => return Err(lost_notification(e)),
        }
    }
}

/// A notification that could not be resolved is a gap in the feed, and only
/// a resync repairs it.
fn lost_notification(err: StoreError) -> FeedError {
    tracing::warn!(error = %err, "Failed to resolve change notification");
    FeedError::Disconnected(format!("change notification lost: {err}"))
}

/// Turn a notification into a full event, re-reading inserted/updated rows.
async fn resolve(pool: &DbPool, n: Notification) -> StoreResult<Option<ChangeEvent>> {
    let record = match (n.kind, n.table) {
        (ChangeKind::Delete, table) => {
            let row = n
                .row
                .ok_or_else(|| StoreError::Decode(format!("delete of {table} {} without row", n.id)))?;
            Some(decode_deleted(table, row)?)
        }
        (_, Table::Incidents) => match IncidentRepo::find_by_id(pool, n.id).await? {
            Some(row) => Some(Record::Incident(Incident::try_from(row)?)),
            None => None,
        },
        (_, Table::ChatMessages) => ChatMessageRepo::find_by_id(pool, n.id)
            .await?
            .map(|row| Record::Message(ChatMessage::from(row))),
    };

    Ok(record.map(|record| ChangeEvent {
        kind: n.kind,
        record,
    }))
}

fn decode_deleted(table: Table, row: serde_json::Value) -> StoreResult<Record> {
    let decode_err = |e: serde_json::Error| StoreError::Decode(e.to_string());
    match table {
        Table::Incidents => {
            let row: IncidentRow = serde_json::from_value(row).map_err(decode_err)?;
            Ok(Record::Incident(Incident::try_from(row)?))
        }
        Table::ChatMessages => {
            let row: ChatMessageRow = serde_json::from_value(row).map_err(decode_err)?;
            Ok(Record::Message(row.into()))
        }
    }
}
