//! Incident reporting and lifecycle actions.

use std::sync::Arc;

use chrono::Utc;
use firewatch_core::error::CoreError;
use firewatch_core::filter::{IncidentFilter, SortOrder};
use firewatch_core::identity::Identity;
use firewatch_core::incident::{Incident, NewIncident};
use firewatch_core::lifecycle::{self, IncidentAction};
use firewatch_core::retry::RetryPolicy;
use firewatch_core::types::EntityId;
use firewatch_db::{RecordStore, StoreError};
use uuid::Uuid;

use super::retry_transient;

pub struct IncidentService {
    store: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl IncidentService {
    pub fn new(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Store a new `pending` incident reported by `reporter`.
    pub async fn report(&self, reporter: &Identity, input: NewIncident) -> Result<Incident, CoreError> {
        let input = NewIncident {
            reported_by: reporter.id,
            ..input
        }
        .validate()?;
        let incident = input.into_incident(Uuid::new_v4(), Utc::now());
        incident.check_invariants()?;

        let stored = match retry_transient(&self.retry, "insert_incident", || {
            self.store.insert_incident(&incident)
        })
        .await
        {
            Ok(stored) => stored,
            // An earlier attempt landed before its response was lost.
            Err(StoreError::Conflict(_)) => self.get(incident.id).await?,
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            incident_id = %stored.id,
            reported_by = %stored.reported_by,
            priority = %stored.priority,
            "Incident reported",
        );
        Ok(stored)
    }

    pub async fn get(&self, id: EntityId) -> Result<Incident, CoreError> {
        retry_transient(&self.retry, "get_incident", || self.store.get_incident(id))
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Incident",
                id,
            })
    }

    pub async fn list(
        &self,
        filter: &IncidentFilter,
        order: SortOrder,
    ) -> Result<Vec<Incident>, CoreError> {
        Ok(retry_transient(&self.retry, "query_incidents", || {
            self.store.query_incidents(filter, order)
        })
        .await?)
    }

    /// Apply a lifecycle action on behalf of `actor`.
    ///
    /// The check runs against a fresh read and the write is guarded on the
    /// status that was read. When another writer got there first the
    /// incident is re-read and the action re-evaluated, which turns a lost
    /// race into [`CoreError::InvalidTransition`] rather than a double
    /// write. A failed call leaves the stored incident untouched.
    pub async fn apply_action(
        &self,
        id: EntityId,
        action: IncidentAction,
        actor: &Identity,
    ) -> Result<Incident, CoreError> {
        loop {
            let current = self.get(id).await?;
            let transition = lifecycle::apply(&current, action, actor, Utc::now())?;

            let result = retry_transient(&self.retry, "update_incident", || {
                self.store
                    .update_incident(&transition.incident, transition.expected)
            })
            .await;

            match result {
                Ok(updated) => {
                    tracing::info!(
                        incident_id = %id,
                        action = %action,
                        actor_id = %actor.id,
                        from = %transition.expected,
                        to = %updated.status,
                        "Incident transition applied",
                    );
                    return Ok(updated);
                }
                Err(StoreError::StatusMismatch { .. }) => {
                    tracing::debug!(
                        incident_id = %id,
                        action = %action,
                        "Incident changed concurrently, re-evaluating",
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
