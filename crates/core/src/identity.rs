//! The acting identity passed explicitly to every core operation.
//!
//! Reporters and dispatchers arrive from different tables with different
//! shapes (a `profiles` row versus a `dispatchers` row). Both are unified
//! into [`Identity`]; dispatcher capability is an optional
//! [`DispatcherLink`] rather than a role string.

use serde::{Deserialize, Serialize};

use crate::profile::Profile;
use crate::roles::Role;
use crate::types::{EntityId, Timestamp};

/// A row of the `dispatchers` table, provisioned administratively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatcher {
    pub id: EntityId,
    /// Auth identity linked to this dispatcher; `None` until an account is provisioned.
    pub user_id: Option<EntityId>,
    pub email: String,
    pub full_name: Option<String>,
    pub station_id: Option<EntityId>,
    pub region: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// Capability tag carried by identities linked to an active dispatcher row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherLink {
    pub dispatcher_id: EntityId,
    pub station_id: Option<EntityId>,
}

/// An authenticated actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: EntityId,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub dispatcher: Option<DispatcherLink>,
}

impl Identity {
    /// A plain identity with no dispatcher capability.
    pub fn new(id: EntityId, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            full_name: None,
            phone: None,
            role,
            dispatcher: None,
        }
    }

    /// Build an identity from a stored profile, attaching dispatcher
    /// capability when `dispatcher` is an active row linked to the same id.
    pub fn from_profile(profile: &Profile, dispatcher: Option<&Dispatcher>) -> Self {
        let identity = Self {
            id: profile.id,
            email: profile.email.clone(),
            full_name: Some(profile.full_name.clone()),
            phone: profile.phone.clone(),
            role: profile.role,
            dispatcher: None,
        };
        match dispatcher {
            Some(d) => identity.with_dispatcher(d),
            None => identity,
        }
    }

    /// Build an identity from a dispatcher row alone.
    ///
    /// Returns `None` when the row has no linked auth identity yet.
    pub fn from_dispatcher(dispatcher: &Dispatcher) -> Option<Self> {
        let user_id = dispatcher.user_id?;
        let identity = Self {
            id: user_id,
            email: dispatcher.email.clone(),
            full_name: dispatcher.full_name.clone(),
            phone: None,
            role: Role::Dispatcher,
            dispatcher: None,
        };
        Some(identity.with_dispatcher(dispatcher))
    }

    /// Attach dispatcher capability if `dispatcher` is active and linked to this identity.
    pub fn with_dispatcher(mut self, dispatcher: &Dispatcher) -> Self {
        if dispatcher.is_active && dispatcher.user_id == Some(self.id) {
            if self.role != Role::Admin {
                self.role = Role::Dispatcher;
            }
            self.dispatcher = Some(DispatcherLink {
                dispatcher_id: dispatcher.id,
                station_id: dispatcher.station_id,
            });
        }
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn is_dispatcher(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name shown to other chat participants; falls back to the email.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn dispatcher_row(user_id: Option<EntityId>, is_active: bool) -> Dispatcher {
        Dispatcher {
            id: Uuid::new_v4(),
            user_id,
            email: "dispatch@example.com".into(),
            full_name: Some("Dana Dispatch".into()),
            station_id: Some(Uuid::new_v4()),
            region: Some("north".into()),
            is_active,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn unlinked_dispatcher_has_no_identity() {
        assert!(Identity::from_dispatcher(&dispatcher_row(None, true)).is_none());
    }

    #[test]
    fn linked_dispatcher_carries_capability() {
        let user_id = Uuid::new_v4();
        let row = dispatcher_row(Some(user_id), true);
        let identity = Identity::from_dispatcher(&row).unwrap();
        assert_eq!(identity.id, user_id);
        assert!(identity.is_dispatcher());
        assert_eq!(identity.dispatcher.unwrap().dispatcher_id, row.id);
        assert_eq!(identity.dispatcher.unwrap().station_id, row.station_id);
    }

    #[test]
    fn inactive_dispatcher_grants_nothing() {
        let user_id = Uuid::new_v4();
        let row = dispatcher_row(Some(user_id), false);
        let identity = Identity::new(user_id, "a@example.com", Role::User).with_dispatcher(&row);
        assert!(!identity.is_dispatcher());
        assert_eq!(identity.role, Role::User);
    }

    #[test]
    fn dispatcher_linked_to_someone_else_is_ignored() {
        let row = dispatcher_row(Some(Uuid::new_v4()), true);
        let identity =
            Identity::new(Uuid::new_v4(), "b@example.com", Role::User).with_dispatcher(&row);
        assert!(!identity.is_dispatcher());
    }

    #[test]
    fn admin_keeps_admin_role_when_linked() {
        let user_id = Uuid::new_v4();
        let row = dispatcher_row(Some(user_id), true);
        let identity = Identity::new(user_id, "root@example.com", Role::Admin).with_dispatcher(&row);
        assert!(identity.is_admin());
        assert!(identity.is_dispatcher());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let identity = Identity::new(Uuid::new_v4(), "c@example.com", Role::User);
        assert_eq!(identity.display_name(), "c@example.com");
        assert_eq!(identity.with_full_name("Casey").display_name(), "Casey");
    }
}
