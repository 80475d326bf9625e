//! Handlers for an incident's chat channel.
//!
//! Access is re-evaluated on every call. Anonymous callers receive a
//! `not logged in` decision rather than a 401 on the read endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use firewatch_core::access::Decision;
use firewatch_core::chat::ChatMessage;
use firewatch_core::types::EntityId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for `POST /incidents/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// GET /api/v1/incidents/{id}/chat/access
pub async fn chat_access(
    auth: Option<AuthIdentity>,
    State(state): State<AppState>,
    Path(incident_id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Decision>>> {
    let identity = auth.map(|AuthIdentity(identity)| identity);
    let decision = state
        .chat
        .can_participate(incident_id, identity.as_ref(), identity.is_some())
        .await?;
    Ok(Json(DataResponse { data: decision }))
}

/// GET /api/v1/incidents/{id}/messages
pub async fn list_messages(
    auth: Option<AuthIdentity>,
    State(state): State<AppState>,
    Path(incident_id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Vec<ChatMessage>>>> {
    let identity = auth.map(|AuthIdentity(identity)| identity);
    let messages = state
        .chat
        .list_messages(incident_id, identity.as_ref(), identity.is_some())
        .await?;
    Ok(Json(DataResponse { data: messages }))
}

/// POST /api/v1/incidents/{id}/messages
pub async fn send_message(
    AuthIdentity(identity): AuthIdentity,
    State(state): State<AppState>,
    Path(incident_id): Path<EntityId>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ChatMessage>>)> {
    let message = state
        .chat
        .send_message(incident_id, &identity, &body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: message })))
}
