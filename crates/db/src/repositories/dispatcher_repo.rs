//! Repository for the `dispatchers` table.

use firewatch_core::types::EntityId;
use sqlx::PgPool;

use crate::models::dispatcher::{CreateDispatcher, DispatcherRow};

/// Column list for dispatchers queries.
const COLUMNS: &str = "id, user_id, email, full_name, station_id, region, is_active, created_at";

/// Provides reads for dispatcher linkage and administrative provisioning.
pub struct DispatcherRepo;

impl DispatcherRepo {
    /// Provision a dispatcher, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateDispatcher,
    ) -> Result<DispatcherRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO dispatchers (user_id, email, full_name, station_id, region)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DispatcherRow>(&query)
            .bind(input.user_id)
            .bind(&input.email)
            .bind(&input.full_name)
            .bind(input.station_id)
            .bind(&input.region)
            .fetch_one(pool)
            .await
    }

    /// Find the dispatcher linked to an auth identity.
    pub async fn find_by_user(
        pool: &PgPool,
        user_id: EntityId,
    ) -> Result<Option<DispatcherRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM dispatchers WHERE user_id = $1");
        sqlx::query_as::<_, DispatcherRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Set the active flag; returns `false` when no such dispatcher exists.
    pub async fn set_active(pool: &PgPool, id: EntityId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE dispatchers SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
