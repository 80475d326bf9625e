//! Repository for the `chat_messages` table.

use firewatch_core::chat::NewChatMessage;
use firewatch_core::filter::SortOrder;
use firewatch_core::incident::IncidentStatus;
use firewatch_core::types::EntityId;
use sqlx::PgPool;

use crate::models::chat_message::ChatMessageRow;

/// Column list for chat_messages queries.
const COLUMNS: &str = "id, incident_id, sender_id, message, created_at";

/// Provides append and read operations for chat messages.
pub struct ChatMessageRepo;

impl ChatMessageRepo {
    /// Append a message while its incident is still open; `id` and
    /// `created_at` are assigned by the database.
    ///
    /// The incident row is share-locked for the insert, so a concurrent
    /// status change either lands first and the insert finds nothing, or
    /// waits until the message is committed. Returns `None` when the
    /// incident is terminal or missing.
    pub async fn create(
        pool: &PgPool,
        input: &NewChatMessage,
    ) -> Result<Option<ChatMessageRow>, sqlx::Error> {
        let open: Vec<&'static str> = IncidentStatus::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .map(IncidentStatus::as_str)
            .collect();
        let query = format!(
            "INSERT INTO chat_messages (incident_id, sender_id, message)
             SELECT $1, $2, $3
             WHERE EXISTS (
                 SELECT 1 FROM incidents
                 WHERE id = $1 AND status = ANY($4)
                 FOR SHARE
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ChatMessageRow>(&query)
            .bind(input.incident_id)
            .bind(input.sender_id)
            .bind(&input.message)
            .bind(open)
            .fetch_optional(pool)
            .await
    }

    /// Find a message by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: EntityId,
    ) -> Result<Option<ChatMessageRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM chat_messages WHERE id = $1");
        sqlx::query_as::<_, ChatMessageRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List an incident's messages by `created_at`, ties broken by id.
    pub async fn list_for_incident(
        pool: &PgPool,
        incident_id: EntityId,
        order: SortOrder,
    ) -> Result<Vec<ChatMessageRow>, sqlx::Error> {
        let dir = order.as_sql();
        let query = format!(
            "SELECT {COLUMNS} FROM chat_messages
             WHERE incident_id = $1
             ORDER BY created_at {dir}, id {dir}"
        );
        sqlx::query_as::<_, ChatMessageRow>(&query)
            .bind(incident_id)
            .fetch_all(pool)
            .await
    }
}
