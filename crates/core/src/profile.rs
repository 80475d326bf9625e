//! Profile record and the decision half of profile reconciliation.
//!
//! Reconciliation guarantees exactly one profile per identity before that
//! identity's first message is stored. [`plan`] decides what to do given the
//! rows found by id and by email; the `api` crate executes the plan against
//! the store and re-plans after any uniqueness conflict.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::roles::Role;
use crate::types::EntityId;

/// A row of the `profiles` table.
///
/// `role` holds the decoded stored role and is never
/// [`Role::Dispatcher`]; dispatcher capability lives in
/// [`crate::identity::DispatcherLink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: EntityId,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl Profile {
    /// The profile a first-time sender should get.
    ///
    /// The role is reduced to what the `profiles.role` constraint accepts and
    /// `full_name` falls back to the email.
    pub fn for_identity(identity: &Identity) -> Self {
        let stored_role = match identity.role.stored_profile_role() {
            crate::roles::ROLE_FIREFIGHTER => Role::Firefighter,
            _ => Role::User,
        };
        let email = normalize_email(&identity.email);
        let full_name = identity
            .full_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.clone());
        Self {
            id: identity.id,
            email,
            full_name,
            phone: identity.phone.clone(),
            role: stored_role,
        }
    }
}

/// What reconciliation must do for a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// A profile with the sender's id already exists; nothing to write.
    Existing(Profile),
    /// A profile with the sender's email exists under a previous id; re-key it.
    Migrate {
        previous_id: EntityId,
        profile: Profile,
    },
    /// No profile exists; insert one.
    Create(Profile),
}

/// Decide the reconciliation step from the current lookups.
pub fn plan(sender: &Identity, by_id: Option<Profile>, by_email: Option<Profile>) -> ReconcilePlan {
    if let Some(existing) = by_id {
        return ReconcilePlan::Existing(existing);
    }

    match by_email {
        Some(found) if found.id != sender.id => {
            let profile = Profile {
                id: sender.id,
                email: found.email.clone(),
                full_name: sender
                    .full_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(found.full_name),
                phone: sender.phone.clone().or(found.phone),
                role: found.role,
            };
            ReconcilePlan::Migrate {
                previous_id: found.id,
                profile,
            }
        }
        // Same id appeared between the two lookups: it exists now.
        Some(found) => ReconcilePlan::Existing(found),
        None => ReconcilePlan::Create(Profile::for_identity(sender)),
    }
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
