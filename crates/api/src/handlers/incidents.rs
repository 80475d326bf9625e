//! Handlers for the `/incidents` resource.
//!
//! All endpoints require authentication via [`AuthIdentity`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use firewatch_core::filter::{IncidentFilter, SortOrder};
use firewatch_core::incident::{Incident, IncidentStatus, NewIncident};
use firewatch_core::lifecycle::IncidentAction;
use firewatch_core::types::EntityId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body for `POST /incidents`. The reporter is always the caller.
#[derive(Debug, Deserialize)]
pub struct ReportIncidentRequest {
    pub station_id: Option<EntityId>,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub description: String,
    pub priority: Option<String>,
    pub location: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Query parameters for `GET /incidents`.
#[derive(Debug, Default, Deserialize)]
pub struct ListIncidentsQuery {
    /// Comma-separated statuses, e.g. `pending,in_progress`.
    pub status: Option<String>,
    pub reported_by: Option<EntityId>,
    pub dispatcher_id: Option<EntityId>,
    pub station_id: Option<EntityId>,
    /// `asc` (default) or `desc` by creation time.
    pub order: Option<SortOrder>,
}

impl ListIncidentsQuery {
    fn into_filter(self) -> AppResult<(IncidentFilter, SortOrder)> {
        let mut filter = IncidentFilter {
            reported_by: self.reported_by,
            dispatcher_id: self.dispatcher_id,
            station_id: self.station_id,
            ..IncidentFilter::default()
        };
        for raw in self.status.iter().flat_map(|s| s.split(',')) {
            let raw = raw.trim();
            if !raw.is_empty() {
                filter = filter.with_status(raw.parse::<IncidentStatus>()?);
            }
        }
        Ok((filter, self.order.unwrap_or_default()))
    }
}

/// Body for `POST /incidents/{id}/actions`.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    /// `approve` (or `approved`), `resolve`, or `cancel`.
    pub action: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/incidents
pub async fn report_incident(
    AuthIdentity(identity): AuthIdentity,
    State(state): State<AppState>,
    Json(body): Json<ReportIncidentRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Incident>>)> {
    let input = NewIncident {
        reported_by: identity.id,
        station_id: body.station_id,
        incident_type: body.incident_type,
        description: body.description,
        priority: body.priority,
        location: body.location,
        media_urls: body.media_urls,
    };
    let incident = state.incidents.report(&identity, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: incident })))
}

/// GET /api/v1/incidents
pub async fn list_incidents(
    _auth: AuthIdentity,
    State(state): State<AppState>,
    Query(params): Query<ListIncidentsQuery>,
) -> AppResult<Json<DataResponse<Vec<Incident>>>> {
    let (filter, order) = params.into_filter()?;
    let incidents = state.incidents.list(&filter, order).await?;
    Ok(Json(DataResponse { data: incidents }))
}

/// GET /api/v1/incidents/{id}
pub async fn get_incident(
    _auth: AuthIdentity,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Incident>>> {
    let incident = state.incidents.get(id).await?;
    Ok(Json(DataResponse { data: incident }))
}

/// POST /api/v1/incidents/{id}/actions
///
/// Returns the incident as stored after the transition. A rejected action
/// leaves the incident unchanged.
pub async fn apply_action(
    AuthIdentity(identity): AuthIdentity,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(body): Json<ActionRequest>,
) -> AppResult<Json<DataResponse<Incident>>> {
    let action: IncidentAction = body.action.trim().parse()?;
    let incident = state.incidents.apply_action(id, action, &identity).await?;
    Ok(Json(DataResponse { data: incident }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_list_is_split_and_deduplicated() {
        let query = ListIncidentsQuery {
            status: Some("pending, in_progress,pending".into()),
            order: Some(SortOrder::Desc),
            ..Default::default()
        };
        let (filter, order) = query.into_filter().unwrap();
        assert_eq!(
            filter.statuses,
            vec![IncidentStatus::Pending, IncidentStatus::InProgress]
        );
        assert_eq!(order, SortOrder::Desc);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let query = ListIncidentsQuery {
            status: Some("approved".into()),
            ..Default::default()
        };
        assert_matches!(query.into_filter(), Err(_));
    }
}
