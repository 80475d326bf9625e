//! Incident chat: access checks, sending, history, and live sessions.
//!
//! Access is decided against a fresh incident read on every call; nothing
//! is cached, so resolving or cancelling an incident locks its chat at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use firewatch_core::access::{self, Decision, DenyReason};
use firewatch_core::change::Record;
use firewatch_core::chat::{normalize_message, ChatMessage, NewChatMessage};
use firewatch_core::error::CoreError;
use firewatch_core::filter::{IncidentFilter, MessageFilter, SortOrder};
use firewatch_core::identity::Identity;
use firewatch_core::incident::Incident;
use firewatch_core::retry::RetryPolicy;
use firewatch_core::types::EntityId;
use firewatch_db::RecordStore;
use firewatch_events::{Delivery, SubscriptionHandle, SyncDispatcher};
use serde::Serialize;

use super::profiles::ProfileReconciler;
use super::retry_transient;

/// An event on an open chat session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    Message(ChatMessage),
    /// The channel closed; no further messages follow.
    Locked(DenyReason),
}

/// Callback for [`ChatEvent`]s. Runs on a sync shard and must not block.
pub type ChatCallback = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// A live chat subscription. Dropping it stops all deliveries.
#[derive(Debug)]
pub struct ChatSession {
    incident_id: EntityId,
    _messages: SubscriptionHandle,
    _incident: SubscriptionHandle,
    locked: Arc<AtomicBool>,
}

impl ChatSession {
    pub fn incident_id(&self) -> EntityId {
        self.incident_id
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

pub struct ChatService {
    store: Arc<dyn RecordStore>,
    sync: SyncDispatcher,
    profiles: ProfileReconciler,
    retry: RetryPolicy,
}

impl ChatService {
    pub fn new(store: Arc<dyn RecordStore>, sync: SyncDispatcher, retry: RetryPolicy) -> Self {
        Self {
            profiles: ProfileReconciler::new(Arc::clone(&store), retry),
            store,
            sync,
            retry,
        }
    }

    async fn fresh_incident(&self, id: EntityId) -> Result<Incident, CoreError> {
        retry_transient(&self.retry, "get_incident", || self.store.get_incident(id))
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Incident",
                id,
            })
    }

    /// Whether `identity` may read and write the incident's chat right now.
    pub async fn can_participate(
        &self,
        incident_id: EntityId,
        identity: Option<&Identity>,
        is_authenticated: bool,
    ) -> Result<Decision, CoreError> {
        let incident = self.fresh_incident(incident_id).await?;
        Ok(access::can_participate(&incident, identity, is_authenticated))
    }

    /// Send a message as `sender`.
    ///
    /// Access is checked first and a denial writes nothing. The sender's
    /// profile is reconciled before the insert; if that fails the message
    /// is never stored.
    pub async fn send_message(
        &self,
        incident_id: EntityId,
        sender: &Identity,
        text: &str,
    ) -> Result<ChatMessage, CoreError> {
        let incident = self.fresh_incident(incident_id).await?;
        if let Err(e) = access::can_participate(&incident, Some(sender), true).into_result() {
            tracing::info!(
                incident_id = %incident_id,
                sender_id = %sender.id,
                reason = %e,
                "Chat send denied",
            );
            return Err(e);
        }

        let message = normalize_message(text)?;
        self.profiles.reconcile(sender).await?;

        // Inserts are not idempotent, so a transient failure goes back to
        // the caller instead of being retried here.
        let stored = self
            .store
            .insert_message(&NewChatMessage {
                incident_id,
                sender_id: sender.id,
                message,
            })
            .await?;

        tracing::debug!(
            incident_id = %incident_id,
            message_id = %stored.id,
            sender_id = %sender.id,
            "Chat message stored",
        );
        Ok(stored)
    }

    /// The incident's messages in creation order, if access is allowed.
    pub async fn list_messages(
        &self,
        incident_id: EntityId,
        identity: Option<&Identity>,
        is_authenticated: bool,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        self.can_participate(incident_id, identity, is_authenticated)
            .await?
            .into_result()?;

        let filter = MessageFilter::for_incident(incident_id);
        Ok(retry_transient(&self.retry, "query_messages", || {
            self.store.query_messages(&filter, SortOrder::Asc)
        })
        .await?)
    }

    /// Open a live chat on an incident.
    ///
    /// Delivers existing then new messages. When the incident stops
    /// admitting `identity` (typically because it was resolved or cancelled)
    /// the session emits one [`ChatEvent::Locked`] and delivers nothing more.
    pub async fn open_chat_session(
        &self,
        incident_id: EntityId,
        identity: &Identity,
        is_authenticated: bool,
        on_event: ChatCallback,
    ) -> Result<ChatSession, CoreError> {
        self.can_participate(incident_id, Some(identity), is_authenticated)
            .await?
            .into_result()?;

        let locked = Arc::new(AtomicBool::new(false));

        let incident_cb = {
            let locked = Arc::clone(&locked);
            let on_event = Arc::clone(&on_event);
            let identity = identity.clone();
            Arc::new(move |delivery: Delivery| {
                let reason = match delivery {
                    Delivery::Upsert(Record::Incident(incident)) => {
                        access::can_participate(&incident, Some(&identity), true).reason
                    }
                    Delivery::Remove { .. } => Some(DenyReason::IncidentClosed),
                    Delivery::Upsert(Record::Message(_)) => None,
                };
                if let Some(reason) = reason {
                    if !locked.swap(true, Ordering::AcqRel) {
                        on_event(ChatEvent::Locked(reason));
                    }
                }
            })
        };

        let message_cb = {
            let locked = Arc::clone(&locked);
            Arc::new(move |delivery: Delivery| {
                if let Delivery::Upsert(Record::Message(message)) = delivery {
                    if !locked.load(Ordering::Acquire) {
                        on_event(ChatEvent::Message(message));
                    }
                }
            })
        };

        let incident_handle = self
            .sync
            .subscribe_incidents(IncidentFilter::by_id(incident_id), incident_cb)
            .await?;
        let message_handle = self.sync.subscribe_messages(incident_id, message_cb).await?;

        tracing::debug!(incident_id = %incident_id, identity_id = %identity.id, "Chat session opened");
        Ok(ChatSession {
            incident_id,
            _messages: message_handle,
            _incident: incident_handle,
            locked,
        })
    }
}
