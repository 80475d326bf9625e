//! Repository for the `incidents` table.

use firewatch_core::filter::{IncidentFilter, SortOrder};
use firewatch_core::incident::{Incident, IncidentStatus};
use firewatch_core::types::EntityId;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::incident::IncidentRow;

/// Column list for incidents queries.
const COLUMNS: &str = "id, status, reported_by, dispatcher_id, station_id, type, \
    description, priority, location, media_urls, created_at, updated_at";

/// Provides reads and guarded writes for incidents.
pub struct IncidentRepo;

impl IncidentRepo {
    /// Insert a new incident snapshot, returning the stored row.
    pub async fn create(pool: &PgPool, incident: &Incident) -> Result<IncidentRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO incidents
                (id, status, reported_by, dispatcher_id, station_id, type,
                 description, priority, location, media_urls, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(incident.id)
            .bind(incident.status.as_str())
            .bind(incident.reported_by)
            .bind(incident.dispatcher_id)
            .bind(incident.station_id)
            .bind(&incident.incident_type)
            .bind(&incident.description)
            .bind(&incident.priority)
            .bind(&incident.location)
            .bind(&incident.media_urls)
            .bind(incident.created_at)
            .bind(incident.updated_at)
            .fetch_one(pool)
            .await
    }

    /// Find an incident by its ID.
    pub async fn find_by_id(pool: &PgPool, id: EntityId) -> Result<Option<IncidentRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM incidents WHERE id = $1");
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List incidents matching `filter`, ordered by `created_at` then `id`.
    pub async fn list(
        pool: &PgPool,
        filter: &IncidentFilter,
        order: SortOrder,
    ) -> Result<Vec<IncidentRow>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM incidents WHERE TRUE"));

        if let Some(id) = filter.id {
            qb.push(" AND id = ").push_bind(id);
        }
        if !filter.statuses.is_empty() {
            let statuses: Vec<&'static str> = filter.statuses.iter().map(|s| s.as_str()).collect();
            qb.push(" AND status = ANY(").push_bind(statuses).push(")");
        }
        if let Some(reported_by) = filter.reported_by {
            qb.push(" AND reported_by = ").push_bind(reported_by);
        }
        if let Some(dispatcher_id) = filter.dispatcher_id {
            qb.push(" AND dispatcher_id = ").push_bind(dispatcher_id);
        }
        if let Some(station_id) = filter.station_id {
            qb.push(" AND station_id = ").push_bind(station_id);
        }

        let dir = order.as_sql();
        qb.push(format!(" ORDER BY created_at {dir}, id {dir}"));

        qb.build_query_as::<IncidentRow>().fetch_all(pool).await
    }

    /// Write a new snapshot only if the stored status still equals `expected`.
    ///
    /// Returns `None` when the guard did not match (or the row is gone); the
    /// caller decides which by re-reading.
    pub async fn update_guarded(
        pool: &PgPool,
        incident: &Incident,
        expected: IncidentStatus,
    ) -> Result<Option<IncidentRow>, sqlx::Error> {
        let query = format!(
            "UPDATE incidents
             SET status = $2, dispatcher_id = $3, station_id = $4, updated_at = $5
             WHERE id = $1 AND status = $6
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IncidentRow>(&query)
            .bind(incident.id)
            .bind(incident.status.as_str())
            .bind(incident.dispatcher_id)
            .bind(incident.station_id)
            .bind(incident.updated_at)
            .bind(expected.as_str())
            .fetch_optional(pool)
            .await
    }
}
