//! PostgreSQL-backed [`RecordStore`].

use async_trait::async_trait;
use firewatch_core::chat::{ChatMessage, NewChatMessage};
use firewatch_core::filter::{IncidentFilter, MessageFilter, SortOrder};
use firewatch_core::identity::Dispatcher;
use firewatch_core::incident::{Incident, IncidentStatus};
use firewatch_core::profile::{normalize_email, Profile};
use firewatch_core::types::EntityId;

use crate::error::{StoreError, StoreResult};
use crate::repositories::{ChatMessageRepo, DispatcherRepo, IncidentRepo, ProfileRepo};
use crate::store::RecordStore;
use crate::DbPool;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn get_incident(&self, id: EntityId) -> StoreResult<Option<Incident>> {
        IncidentRepo::find_by_id(&self.pool, id)
            .await?
            .map(Incident::try_from)
            .transpose()
    }

    async fn query_incidents(
        &self,
        filter: &IncidentFilter,
        order: SortOrder,
    ) -> StoreResult<Vec<Incident>> {
        IncidentRepo::list(&self.pool, filter, order)
            .await?
            .into_iter()
            .map(Incident::try_from)
            .collect()
    }

    async fn insert_incident(&self, incident: &Incident) -> StoreResult<Incident> {
        IncidentRepo::create(&self.pool, incident).await?.try_into()
    }

    async fn update_incident(
        &self,
        incident: &Incident,
        expected: IncidentStatus,
    ) -> StoreResult<Incident> {
        if let Some(row) = IncidentRepo::update_guarded(&self.pool, incident, expected).await? {
            return row.try_into();
        }

        // The guard missed: tell a vanished row apart from a lost race.
        match IncidentRepo::find_by_id(&self.pool, incident.id).await? {
            Some(_) => Err(StoreError::StatusMismatch {
                id: incident.id,
                expected,
            }),
            None => Err(StoreError::NotFound {
                entity: "Incident",
                id: incident.id,
            }),
        }
    }

    async fn insert_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage> {
        if let Some(row) = ChatMessageRepo::create(&self.pool, message).await? {
            return Ok(row.into());
        }

        match IncidentRepo::find_by_id(&self.pool, message.incident_id).await? {
            Some(_) => Err(StoreError::IncidentClosed {
                id: message.incident_id,
            }),
            None => Err(StoreError::NotFound {
                entity: "Incident",
                id: message.incident_id,
            }),
        }
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> StoreResult<Vec<ChatMessage>> {
        let rows = ChatMessageRepo::list_for_incident(&self.pool, filter.incident_id, order).await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    async fn get_profile(&self, id: EntityId) -> StoreResult<Option<Profile>> {
        ProfileRepo::find_by_id(&self.pool, id)
            .await?
            .map(Profile::try_from)
            .transpose()
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        ProfileRepo::find_by_email(&self.pool, &normalize_email(email))
            .await?
            .map(Profile::try_from)
            .transpose()
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        ProfileRepo::create(&self.pool, profile).await?.try_into()
    }

    async fn rekey_profile(
        &self,
        previous_id: EntityId,
        profile: &Profile,
    ) -> StoreResult<Option<Profile>> {
        ProfileRepo::rekey(&self.pool, previous_id, profile)
            .await?
            .map(Profile::try_from)
            .transpose()
    }

    async fn find_dispatcher_by_user(&self, user_id: EntityId) -> StoreResult<Option<Dispatcher>> {
        Ok(DispatcherRepo::find_by_user(&self.pool, user_id)
            .await?
            .map(Dispatcher::from))
    }
}
