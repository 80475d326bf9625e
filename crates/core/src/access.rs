//! Chat access control.
//!
//! [`can_participate`] decides whether an identity may read or write an
//! incident's chat. It must be evaluated against a fresh incident snapshot
//! on every read and every send; results are never cached because a status
//! change to a terminal state locks the channel immediately.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::Identity;
use crate::incident::Incident;

/// Why chat access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotLoggedIn,
    IncidentClosed,
    NotParticipant,
    NoDispatcherAssigned,
}

impl DenyReason {
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::NotLoggedIn => "not logged in",
            DenyReason::IncidentClosed => "incident closed",
            DenyReason::NotParticipant => "not a participant",
            DenyReason::NoDispatcherAssigned => "no dispatcher assigned yet",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }

    /// Convert a denial into [`CoreError::Forbidden`].
    pub fn into_result(self) -> Result<(), CoreError> {
        match self.reason {
            Some(reason) if !self.allowed => Err(CoreError::Forbidden(reason)),
            _ => Ok(()),
        }
    }
}

/// Decide whether `identity` may take part in `incident`'s chat.
///
/// Rules, first match wins:
/// 1. not authenticated
/// 2. incident resolved or cancelled
/// 3. identity is neither reporter nor assigned dispatcher
/// 4. no dispatcher assigned
pub fn can_participate(
    incident: &Incident,
    identity: Option<&Identity>,
    is_authenticated: bool,
) -> Decision {
    let Some(identity) = identity.filter(|_| is_authenticated) else {
        return Decision::deny(DenyReason::NotLoggedIn);
    };

    if incident.status.is_terminal() {
        return Decision::deny(DenyReason::IncidentClosed);
    }

    if !incident.is_participant(identity.id) {
        return Decision::deny(DenyReason::NotParticipant);
    }

    if incident.dispatcher_id.is_none() {
        return Decision::deny(DenyReason::NoDispatcherAssigned);
    }

    Decision::allow()
}
