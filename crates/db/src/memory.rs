//! In-process [`RecordStore`] and [`ChangeFeed`].
//!
//! Backs tests and local tooling with the same guarantees the PostgreSQL
//! store gives: guarded incident updates, unique profile ids and emails,
//! and a change feed whose order matches commit order (events are published
//! while the write lock is held).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use firewatch_core::change::{ChangeEvent, Record, Table};
use firewatch_core::chat::{sort_messages, ChatMessage, NewChatMessage};
use firewatch_core::filter::{IncidentFilter, MessageFilter, SortOrder};
use firewatch_core::identity::Dispatcher;
use firewatch_core::incident::{Incident, IncidentStatus};
use firewatch_core::lifecycle::next_updated_at;
use firewatch_core::profile::{normalize_email, Profile};
use firewatch_core::types::EntityId;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::feed::{ChangeFeed, FeedError, FeedSubscription};
use crate::store::RecordStore;

/// Capacity of the change broadcast channel.
const FEED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Tables {
    incidents: HashMap<EntityId, Incident>,
    messages: HashMap<EntityId, ChatMessage>,
    profiles: HashMap<EntityId, Profile>,
    dispatchers: Vec<Dispatcher>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    events: Mutex<broadcast::Sender<ChangeEvent>>,
    capacity: usize,
    pending_failures: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    /// A store whose feed buffers at most `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tables: RwLock::new(Tables::default()),
            events: Mutex::new(tx),
            capacity,
            pending_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` store operations fail with
    /// [`StoreError::Transient`].
    pub fn inject_failures(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Close every open feed subscription, as if the connection dropped.
    ///
    /// Subscribers drain what was already buffered, then see
    /// [`FeedError::Disconnected`]. Later subscriptions work normally.
    pub fn disconnect_feeds(&self) {
        let (tx, _) = broadcast::channel(self.capacity);
        if let Ok(mut events) = self.events.lock() {
            *events = tx;
        }
    }

    pub async fn add_dispatcher(&self, dispatcher: Dispatcher) {
        self.tables.write().await.dispatchers.push(dispatcher);
    }

    /// Delete an incident and, by cascade, its messages.
    pub async fn delete_incident(&self, id: EntityId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let incident = tables.incidents.remove(&id).ok_or(StoreError::NotFound {
            entity: "Incident",
            id,
        })?;

        let mut orphans: Vec<ChatMessage> = tables
            .messages
            .values()
            .filter(|m| m.incident_id == id)
            .cloned()
            .collect();
        sort_messages(&mut orphans);
        for message in orphans {
            tables.messages.remove(&message.id);
            self.publish(ChangeEvent::delete(Record::Message(message)));
        }
        self.publish(ChangeEvent::delete(Record::Incident(incident)));
        Ok(())
    }

    /// Number of profiles currently stored.
    pub async fn profile_count(&self) -> usize {
        self.tables.read().await.profiles.len()
    }

    fn take_failure(&self) -> StoreResult<()> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StoreError::Transient("injected failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn publish(&self, event: ChangeEvent) {
        if let Ok(events) = self.events.lock() {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.take_failure()
    }

    async fn get_incident(&self, id: EntityId) -> StoreResult<Option<Incident>> {
        self.take_failure()?;
        Ok(self.tables.read().await.incidents.get(&id).cloned())
    }

    async fn query_incidents(
        &self,
        filter: &IncidentFilter,
        order: SortOrder,
    ) -> StoreResult<Vec<Incident>> {
        self.take_failure()?;
        let tables = self.tables.read().await;
        let mut found: Vec<Incident> = tables
            .incidents
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if order == SortOrder::Desc {
            found.reverse();
        }
        Ok(found)
    }

    async fn insert_incident(&self, incident: &Incident) -> StoreResult<Incident> {
        self.take_failure()?;
        let mut tables = self.tables.write().await;
        if tables.incidents.contains_key(&incident.id) {
            return Err(StoreError::Conflict(format!(
                "Incident {} already exists",
                incident.id
            )));
        }
        tables.incidents.insert(incident.id, incident.clone());
        self.publish(ChangeEvent::insert(Record::Incident(incident.clone())));
        Ok(incident.clone())
    }

    async fn update_incident(
        &self,
        incident: &Incident,
        expected: IncidentStatus,
    ) -> StoreResult<Incident> {
        self.take_failure()?;
        let mut tables = self.tables.write().await;
        let current = tables
            .incidents
            .get_mut(&incident.id)
            .ok_or(StoreError::NotFound {
                entity: "Incident",
                id: incident.id,
            })?;
        if current.status != expected {
            return Err(StoreError::StatusMismatch {
                id: incident.id,
                expected,
            });
        }
        current.status = incident.status;
        current.dispatcher_id = incident.dispatcher_id;
        current.station_id = incident.station_id;
        current.updated_at = incident.updated_at;
        let stored = current.clone();
        self.publish(ChangeEvent::update(Record::Incident(stored.clone())));
        Ok(stored)
    }

    async fn insert_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage> {
        self.take_failure()?;
        let mut tables = self.tables.write().await;
        match tables.incidents.get(&message.incident_id) {
            None => {
                return Err(StoreError::NotFound {
                    entity: "Incident",
                    id: message.incident_id,
                })
            }
            Some(incident) if incident.status.is_terminal() => {
                return Err(StoreError::IncidentClosed {
                    id: message.incident_id,
                })
            }
            Some(_) => {}
        }

        // Keep created_at strictly increasing within an incident.
        let now = Utc::now();
        let created_at = tables
            .messages
            .values()
            .filter(|m| m.incident_id == message.incident_id)
            .map(|m| m.created_at)
            .max()
            .map_or(now, |last| next_updated_at(last, now));

        let stored = ChatMessage {
            id: Uuid::new_v4(),
            incident_id: message.incident_id,
            sender_id: message.sender_id,
            message: message.message.clone(),
            created_at,
        };
        tables.messages.insert(stored.id, stored.clone());
        self.publish(ChangeEvent::insert(Record::Message(stored.clone())));
        Ok(stored)
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> StoreResult<Vec<ChatMessage>> {
        self.take_failure()?;
        let tables = self.tables.read().await;
        let mut found: Vec<ChatMessage> = tables
            .messages
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        sort_messages(&mut found);
        if order == SortOrder::Desc {
            found.reverse();
        }
        Ok(found)
    }

    async fn get_profile(&self, id: EntityId) -> StoreResult<Option<Profile>> {
        self.take_failure()?;
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        self.take_failure()?;
        let email = normalize_email(email);
        let tables = self.tables.read().await;
        Ok(tables.profiles.values().find(|p| p.email == email).cloned())
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        self.take_failure()?;
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict(format!(
                "Profile {} already exists",
                profile.id
            )));
        }
        if tables.profiles.values().any(|p| p.email == profile.email) {
            return Err(StoreError::Conflict(format!(
                "Profile email {} already exists",
                profile.email
            )));
        }
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn rekey_profile(
        &self,
        previous_id: EntityId,
        profile: &Profile,
    ) -> StoreResult<Option<Profile>> {
        self.take_failure()?;
        let mut tables = self.tables.write().await;
        let matches_previous = tables
            .profiles
            .get(&previous_id)
            .is_some_and(|p| p.email == profile.email);
        if !matches_previous {
            return Ok(None);
        }
        if previous_id != profile.id && tables.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict(format!(
                "Profile {} already exists",
                profile.id
            )));
        }

        tables.profiles.remove(&previous_id);
        tables.profiles.insert(profile.id, profile.clone());
        for message in tables.messages.values_mut() {
            if message.sender_id == previous_id {
                message.sender_id = profile.id;
            }
        }
        Ok(Some(profile.clone()))
    }

    async fn find_dispatcher_by_user(&self, user_id: EntityId) -> StoreResult<Option<Dispatcher>> {
        self.take_failure()?;
        let tables = self.tables.read().await;
        Ok(tables
            .dispatchers
            .iter()
            .find(|d| d.user_id == Some(user_id))
            .cloned())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, tables: &[Table]) -> StoreResult<FeedSubscription> {
        let rx = self
            .events
            .lock()
            .map_err(|_| StoreError::Transient("change feed unavailable".to_string()))?
            .subscribe();
        let tables = tables.to_vec();

        let stream = futures::stream::unfold(Some(rx), move |rx| {
            let tables = tables.clone();
            async move {
                let mut rx = rx?;
                loop {
                    match rx.recv().await {
                        Ok(event) if tables.contains(&event.record.table()) => {
                            return Some((Ok(event), Some(rx)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            return Some((Err(FeedError::Lagged(n)), Some(rx)));
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Some((
                                Err(FeedError::Disconnected("feed closed".to_string())),
                                None,
                            ));
                        }
                    }
                }
            }
        });

        Ok(FeedSubscription::new(stream))
    }
}
