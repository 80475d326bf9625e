//! Profile row model.

use firewatch_core::profile::Profile;
use firewatch_core::roles::Role;
use firewatch_core::types::{EntityId, Timestamp};
use sqlx::FromRow;

use crate::error::StoreError;

/// A row from the `profiles` table. `role` holds the stored encoding.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: EntityId,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            phone: row.phone,
            role: Role::from_stored_profile_role(&row.role)?,
        })
    }
}
