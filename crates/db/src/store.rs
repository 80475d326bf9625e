//! The record store contract.
//!
//! Implementations must make [`RecordStore::update_incident`] a single
//! compare-and-swap on the stored status and must reject a second profile
//! for the same id or email with [`StoreError::Conflict`].

use async_trait::async_trait;
use firewatch_core::chat::{ChatMessage, NewChatMessage};
use firewatch_core::filter::{IncidentFilter, MessageFilter, SortOrder};
use firewatch_core::identity::Dispatcher;
use firewatch_core::incident::{Incident, IncidentStatus};
use firewatch_core::profile::Profile;
use firewatch_core::types::EntityId;

use crate::error::StoreResult;

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Cheap liveness probe used by health checks.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_incident(&self, id: EntityId) -> StoreResult<Option<Incident>>;

    async fn query_incidents(
        &self,
        filter: &IncidentFilter,
        order: SortOrder,
    ) -> StoreResult<Vec<Incident>>;

    async fn insert_incident(&self, incident: &Incident) -> StoreResult<Incident>;

    /// Store `incident` only if the current row still has status `expected`.
    ///
    /// Fails with [`crate::StoreError::StatusMismatch`] when the guard does
    /// not hold and [`crate::StoreError::NotFound`] when the row is gone.
    async fn update_incident(
        &self,
        incident: &Incident,
        expected: IncidentStatus,
    ) -> StoreResult<Incident>;

    /// Append a message. The store assigns `id` and `created_at`.
    ///
    /// The write is atomic with a check that the incident is not terminal.
    /// Fails with [`crate::StoreError::IncidentClosed`] when it is and
    /// [`crate::StoreError::NotFound`] when the incident is gone.
    async fn insert_message(&self, message: &NewChatMessage) -> StoreResult<ChatMessage>;

    async fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
    ) -> StoreResult<Vec<ChatMessage>>;

    async fn get_profile(&self, id: EntityId) -> StoreResult<Option<Profile>>;

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>>;

    /// Insert a profile; a duplicate id or email is a conflict.
    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile>;

    /// Re-key the profile stored under `previous_id` to `profile.id`.
    ///
    /// The sender id of that profile's messages moves with it. This is the
    /// one write to existing messages; it publishes no change events, since
    /// message text and order are untouched.
    ///
    /// Returns `None` when no row with that id and email exists any more.
    async fn rekey_profile(
        &self,
        previous_id: EntityId,
        profile: &Profile,
    ) -> StoreResult<Option<Profile>>;

    async fn find_dispatcher_by_user(&self, user_id: EntityId) -> StoreResult<Option<Dispatcher>>;
}
