//! Route definitions for the `/incidents` resource and its chat.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{chat, incidents};
use crate::state::AppState;

/// Routes mounted at `/incidents`.
///
/// ```text
/// GET    /                    -> list_incidents
/// POST   /                    -> report_incident
/// GET    /{id}                -> get_incident
/// POST   /{id}/actions        -> apply_action
///
/// GET    /{id}/chat/access    -> chat_access
/// GET    /{id}/messages       -> list_messages
/// POST   /{id}/messages       -> send_message
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(incidents::list_incidents).post(incidents::report_incident),
        )
        .route("/{id}", get(incidents::get_incident))
        .route("/{id}/actions", post(incidents::apply_action))
        // Chat
        .route("/{id}/chat/access", get(chat::chat_access))
        .route(
            "/{id}/messages",
            get(chat::list_messages).post(chat::send_message),
        )
}
