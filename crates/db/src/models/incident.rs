//! Incident row model.

use firewatch_core::incident::Incident;
use firewatch_core::types::{EntityId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

use crate::error::StoreError;

/// A row from the `incidents` table.
///
/// Also decodes the partial row carried by delete notifications, which omit
/// the large text columns.
#[derive(Debug, Clone, FromRow, Deserialize)]
pub struct IncidentRow {
    pub id: EntityId,
    pub status: String,
    pub reported_by: EntityId,
    pub dispatcher_id: Option<EntityId>,
    pub station_id: Option<EntityId>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub incident_type: String,
    #[serde(default)]
    pub description: String,
    pub priority: String,
    pub location: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<IncidentRow> for Incident {
    type Error = StoreError;

    fn try_from(row: IncidentRow) -> Result<Self, Self::Error> {
        Ok(Incident {
            id: row.id,
            status: row.status.parse()?,
            reported_by: row.reported_by,
            dispatcher_id: row.dispatcher_id,
            station_id: row.station_id,
            incident_type: row.incident_type,
            description: row.description,
            priority: row.priority,
            location: row.location,
            media_urls: row.media_urls,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
