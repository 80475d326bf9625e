//! Chat message row model.

use firewatch_core::chat::ChatMessage;
use firewatch_core::types::{EntityId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

/// A row from the `chat_messages` table.
#[derive(Debug, Clone, FromRow, Deserialize)]
pub struct ChatMessageRow {
    pub id: EntityId,
    pub incident_id: EntityId,
    pub sender_id: EntityId,
    #[serde(default)]
    pub message: String,
    pub created_at: Timestamp,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        ChatMessage {
            id: row.id,
            incident_id: row.incident_id,
            sender_id: row.sender_id,
            message: row.message,
            created_at: row.created_at,
        }
    }
}
