use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use firewatch_core::access::DenyReason;
use firewatch_core::error::CoreError;
use firewatch_core::filter::Predicate;
use firewatch_core::identity::Identity;
use firewatch_events::SubscriptionHandle;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::jwt::validate_token;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{resolve_identity, AuthIdentity};
use crate::services::chat::ChatCallback;
use crate::services::ChatSession;
use crate::state::AppState;
use crate::ws::protocol::{ClientRequest, ServerMessage};

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Browsers cannot set headers on a WebSocket upgrade, so the token may
/// also be passed as `?token=`.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Upgrade to a WebSocket.
///
/// An anonymous connection is accepted, but every subscription it requests
/// is refused.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    auth: Option<AuthIdentity>,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let identity = match (auth, params.token) {
        (Some(AuthIdentity(identity)), _) => Some(identity),
        (None, Some(token)) => {
            let claims = validate_token(&token, &state.config.jwt)
                .map_err(|_| AppError::Unauthenticated("Invalid or expired token".into()))?;
            Some(resolve_identity(&state, claims).await?)
        }
        (None, None) => None,
    };

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response())
}

// Held only for its Drop, which ends the subscription.
#[allow(dead_code)]
enum Subscription {
    Feed(SubscriptionHandle),
    Chat(ChatSession),
}

/// Per-connection subscription state.
struct Connection {
    state: AppState,
    identity: Option<Identity>,
    tx: mpsc::Sender<ServerMessage>,
    /// Cancelled when a delivery finds the outbound buffer full.
    overflow: CancellationToken,
    next_id: u64,
    subscriptions: HashMap<u64, Subscription>,
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let conn_id = Uuid::new_v4();
    tracing::info!(
        conn_id = %conn_id,
        identity_id = ?identity.as_ref().map(|i| i.id),
        "WebSocket connected",
    );

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.sync_observer_buffer.max(1));
    let (mut sink, mut stream) = socket.split();

    // Sender task: serialize outbound frames and keep the connection alive.
    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        loop {
            let frame = tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match serde_json::to_string(&msg) {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => {
                            tracing::warn!(conn_id = %conn_id, error = %e, "Failed to encode frame");
                            continue;
                        }
                    }
                }
                _ = heartbeat.tick() => Message::Ping(Default::default()),
            };
            if sink.send(frame).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let mut conn = Connection {
        state,
        identity,
        tx,
        overflow: CancellationToken::new(),
        next_id: 1,
        subscriptions: HashMap::new(),
    };
    let overflow = conn.overflow.clone();

    loop {
        let result = tokio::select! {
            _ = overflow.cancelled() => {
                tracing::warn!(conn_id = %conn_id, "Outbound buffer full, closing WebSocket");
                break;
            }
            next = stream.next() => match next {
                Some(result) => result,
                None => break,
            },
        };
        match result {
            Ok(Message::Text(text)) => conn.handle_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    let subscriptions = conn.subscriptions.len();
    drop(conn);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, subscriptions, "WebSocket disconnected");
}

impl Connection {
    async fn handle_text(&mut self, text: &str) {
        let request = match serde_json::from_str::<ClientRequest>(text) {
            Ok(request) => request,
            Err(e) => {
                self.send_error(&AppError::BadRequest(format!("Invalid request: {e}")));
                return;
            }
        };

        match request {
            ClientRequest::Subscribe(predicate) => {
                let id = self.next_id;
                self.next_id += 1;
                match self.subscribe(id, predicate).await {
                    Ok(subscription) => {
                        self.subscriptions.insert(id, subscription);
                        push(&self.tx, &self.overflow, ServerMessage::Subscribed { subscription: id });
                    }
                    Err(e) => self.send_error(&e),
                }
            }
            ClientRequest::Unsubscribe { unsubscribe } => {
                if self.subscriptions.remove(&unsubscribe).is_some() {
                    push(
                        &self.tx,
                        &self.overflow,
                        ServerMessage::Unsubscribed {
                            subscription: unsubscribe,
                        },
                    );
                } else {
                    self.send_error(&AppError::BadRequest(format!(
                        "Unknown subscription {unsubscribe}"
                    )));
                }
            }
        }
    }

    /// Open a subscription. Its deliveries may reach the client before the
    /// `subscribed` acknowledgement.
    async fn subscribe(&self, id: u64, predicate: Predicate) -> AppResult<Subscription> {
        match predicate {
            Predicate::Incidents(filter) => {
                if self.identity.is_none() {
                    return Err(AppError::Unauthenticated(
                        "Login required to watch incidents".into(),
                    ));
                }
                let tx = self.tx.clone();
                let overflow = self.overflow.clone();
                let handle = self
                    .state
                    .sync
                    .subscribe_incidents(
                        filter,
                        Arc::new(move |delivery| {
                            push(
                                &tx,
                                &overflow,
                                ServerMessage::Change {
                                    subscription: id,
                                    delivery,
                                },
                            )
                        }),
                    )
                    .await?;
                Ok(Subscription::Feed(handle))
            }
            Predicate::Messages(filter) => {
                let Some(identity) = self.identity.as_ref() else {
                    return Err(CoreError::Forbidden(DenyReason::NotLoggedIn).into());
                };
                let tx = self.tx.clone();
                let overflow = self.overflow.clone();
                let on_event: ChatCallback = Arc::new(move |event| {
                    push(
                        &tx,
                        &overflow,
                        ServerMessage::Chat {
                            subscription: id,
                            event,
                        },
                    )
                });
                let session = self
                    .state
                    .chat
                    .open_chat_session(filter.incident_id, identity, true, on_event)
                    .await?;
                Ok(Subscription::Chat(session))
            }
        }
    }

    fn send_error(&self, err: &AppError) {
        let (_, code, error) = err.parts();
        push(&self.tx, &self.overflow, ServerMessage::Error { error, code });
    }
}

/// Queue a frame without blocking. A full buffer means the client is not
/// keeping up, so the connection is closed instead of stalling a shard.
fn push(tx: &mpsc::Sender<ServerMessage>, overflow: &CancellationToken, msg: ServerMessage) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(msg) {
        overflow.cancel();
    }
}
