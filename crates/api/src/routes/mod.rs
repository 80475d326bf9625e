pub mod health;
pub mod incidents;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                   WebSocket subscriptions
///
/// /incidents                            list (GET), report (POST)
/// /incidents/{id}                       get
/// /incidents/{id}/actions               approve | resolve | cancel (POST)
/// /incidents/{id}/chat/access           participation decision
/// /incidents/{id}/messages              list (GET), send (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/incidents", incidents::router())
}
