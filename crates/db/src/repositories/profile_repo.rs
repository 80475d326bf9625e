//! Repository for the `profiles` table.

use firewatch_core::profile::Profile;
use firewatch_core::types::EntityId;
use sqlx::PgPool;

use crate::models::profile::ProfileRow;

/// Column list for profiles queries.
const COLUMNS: &str = "id, email, full_name, phone, role, created_at, updated_at";

/// Provides lookups and conflict-detecting writes for profiles.
pub struct ProfileRepo;

impl ProfileRepo {
    /// Find a profile by identity id.
    pub async fn find_by_id(pool: &PgPool, id: EntityId) -> Result<Option<ProfileRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a profile by (normalized) email.
    pub async fn find_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<ProfileRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM profiles WHERE email = $1");
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Insert a profile.
    ///
    /// A concurrent insert of the same id or email fails with a unique
    /// violation rather than creating a second row.
    pub async fn create(pool: &PgPool, profile: &Profile) -> Result<ProfileRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO profiles (id, email, full_name, phone, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(profile.id)
            .bind(&profile.email)
            .bind(&profile.full_name)
            .bind(&profile.phone)
            .bind(profile.role.stored_profile_role())
            .fetch_one(pool)
            .await
    }

    /// Move the profile stored under `previous_id` to `profile.id`,
    /// refreshing `full_name` and `phone`.
    ///
    /// Guarded on both the previous id and the email so a row that changed
    /// underneath is left alone; returns `None` in that case.
    pub async fn rekey(
        pool: &PgPool,
        previous_id: EntityId,
        profile: &Profile,
    ) -> Result<Option<ProfileRow>, sqlx::Error> {
        let query = format!(
            "UPDATE profiles
             SET id = $2, full_name = $3, phone = $4, updated_at = now()
             WHERE id = $1 AND email = $5
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(previous_id)
            .bind(profile.id)
            .bind(&profile.full_name)
            .bind(&profile.phone)
            .bind(&profile.email)
            .fetch_optional(pool)
            .await
    }
}
