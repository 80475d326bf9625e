//! Profile reconciliation: exactly one profile per identity before its
//! first message is stored.

use std::sync::Arc;

use firewatch_core::error::CoreError;
use firewatch_core::identity::Identity;
use firewatch_core::profile::{self, Profile, ReconcilePlan};
use firewatch_core::retry::RetryPolicy;
use firewatch_db::{RecordStore, StoreError, StoreResult};

pub struct ProfileReconciler {
    store: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl ProfileReconciler {
    pub fn new(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Ensure `sender` has a profile, creating or re-keying one if needed.
    ///
    /// Each attempt reads, plans, and performs one guarded write. A
    /// uniqueness conflict means a concurrent caller wrote first, so the
    /// next attempt re-reads at once; transient failures back off. Running
    /// out of attempts yields [`CoreError::ProfileReconciliationFailed`].
    pub async fn reconcile(&self, sender: &Identity) -> Result<Profile, CoreError> {
        let mut attempt = 1;
        loop {
            let err = match self.attempt(sender).await {
                Ok(profile) => return Ok(profile),
                Err(e) => e,
            };

            let retryable = err.is_conflict() || err.is_transient();
            if !retryable || !self.retry.should_retry(attempt) {
                tracing::error!(
                    identity_id = %sender.id,
                    attempt,
                    error = %err,
                    "Profile reconciliation failed",
                );
                return Err(CoreError::ProfileReconciliationFailed(format!(
                    "after {attempt} attempt(s): {err}"
                )));
            }

            if err.is_transient() {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            } else {
                tracing::debug!(identity_id = %sender.id, attempt, "Profile write raced, re-reading");
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, sender: &Identity) -> StoreResult<Profile> {
        let by_id = self.store.get_profile(sender.id).await?;
        let by_email = match by_id {
            Some(_) => None,
            None => self.store.find_profile_by_email(&sender.email).await?,
        };

        match profile::plan(sender, by_id, by_email) {
            ReconcilePlan::Existing(existing) => Ok(existing),
            ReconcilePlan::Migrate {
                previous_id,
                profile,
            } => {
                let moved = self
                    .store
                    .rekey_profile(previous_id, &profile)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Conflict(format!("profile {previous_id} changed during migration"))
                    })?;
                tracing::info!(
                    identity_id = %sender.id,
                    previous_id = %previous_id,
                    "Profile migrated to new identity id",
                );
                Ok(moved)
            }
            ReconcilePlan::Create(profile) => {
                let created = self.store.insert_profile(&profile).await?;
                tracing::info!(identity_id = %sender.id, "Profile created");
                Ok(created)
            }
        }
    }
}
