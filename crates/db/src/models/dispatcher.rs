//! Dispatcher row model.

use firewatch_core::identity::Dispatcher;
use firewatch_core::types::{EntityId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

/// A row from the `dispatchers` table.
#[derive(Debug, Clone, FromRow)]
pub struct DispatcherRow {
    pub id: EntityId,
    pub user_id: Option<EntityId>,
    pub email: String,
    pub full_name: Option<String>,
    pub station_id: Option<EntityId>,
    pub region: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl From<DispatcherRow> for Dispatcher {
    fn from(row: DispatcherRow) -> Self {
        Dispatcher {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            full_name: row.full_name,
            station_id: row.station_id,
            region: row.region,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// DTO for provisioning a dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDispatcher {
    pub user_id: Option<EntityId>,
    pub email: String,
    pub full_name: Option<String>,
    pub station_id: Option<EntityId>,
    pub region: Option<String>,
}
