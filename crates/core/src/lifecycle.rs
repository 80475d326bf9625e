//! Incident lifecycle state machine.
//!
//! ```text
//! pending ──approve──▶ in_progress ──resolve──▶ resolved
//!    │                     │
//!    └──────cancel─────────┴──────cancel──────▶ cancelled
//! ```
//!
//! [`apply`] is a total, pure function of `(incident, action, actor, now)`.
//! It returns the next snapshot together with the status the store must
//! still hold for the write to succeed; the caller performs that write as a
//! single compare-and-swap so concurrent callers cannot both win.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::Identity;
use crate::incident::{Incident, IncidentStatus};
use crate::types::{EntityId, Timestamp};

/// A requested lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentAction {
    /// Accept a pending report and assign the approving dispatcher.
    #[serde(alias = "approved")]
    Approve,
    Resolve,
    Cancel,
}

impl IncidentAction {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentAction::Approve => "approve",
            IncidentAction::Resolve => "resolve",
            IncidentAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for IncidentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" | "approved" => Ok(IncidentAction::Approve),
            "resolve" => Ok(IncidentAction::Resolve),
            "cancel" => Ok(IncidentAction::Cancel),
            other => Err(CoreError::Validation(format!(
                "Invalid incident action '{other}'. Must be one of: approve, resolve, cancel"
            ))),
        }
    }
}

/// The outcome of an accepted action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The incident as it must be stored.
    pub incident: Incident,
    /// Status the stored row must still have for the write to apply.
    pub expected: IncidentStatus,
    pub action: IncidentAction,
    /// Dispatcher identity newly assigned by this transition, if any.
    pub assigned: Option<EntityId>,
}

/// Target state for `action` from `from`, or `None` when the pair is illegal.
pub fn target(from: IncidentStatus, action: IncidentAction) -> Option<IncidentStatus> {
    use IncidentAction::*;
    use IncidentStatus::*;

    match (from, action) {
        (Pending, Approve) => Some(InProgress),
        (InProgress, Resolve) => Some(Resolved),
        (Pending | InProgress, Cancel) => Some(Cancelled),
        _ => None,
    }
}

/// Actions that are legal from `from`, regardless of who asks.
pub fn available_actions(from: IncidentStatus) -> Vec<IncidentAction> {
    [
        IncidentAction::Approve,
        IncidentAction::Resolve,
        IncidentAction::Cancel,
    ]
    .into_iter()
    .filter(|a| target(from, *a).is_some())
    .collect()
}

/// Apply `action` to `incident` on behalf of `actor`.
///
/// Legality is checked before permission, so every action against a
/// terminal incident fails with [`CoreError::InvalidTransition`] whoever
/// the actor is.
pub fn apply(
    incident: &Incident,
    action: IncidentAction,
    actor: &Identity,
    now: Timestamp,
) -> Result<Transition, CoreError> {
    let to = target(incident.status, action).ok_or(CoreError::InvalidTransition {
        from: incident.status,
        action,
    })?;

    authorize(incident, action, actor)?;

    let mut next = incident.clone();
    next.status = to;
    next.updated_at = next_updated_at(incident.updated_at, now);

    let mut assigned = None;
    if action == IncidentAction::Approve && next.dispatcher_id.is_none() {
        next.dispatcher_id = Some(actor.id);
        assigned = Some(actor.id);
        if next.station_id.is_none() {
            next.station_id = actor.dispatcher.and_then(|link| link.station_id);
        }
    }

    next.check_invariants()?;

    Ok(Transition {
        incident: next,
        expected: incident.status,
        action,
        assigned,
    })
}

/// Check that `actor` may perform `action` on `incident`.
pub fn authorize(
    incident: &Incident,
    action: IncidentAction,
    actor: &Identity,
) -> Result<(), CoreError> {
    match action {
        IncidentAction::Approve => {
            if actor.is_dispatcher() {
                Ok(())
            } else {
                Err(CoreError::Unauthorized(
                    "Only an active dispatcher may approve incidents".to_string(),
                ))
            }
        }
        IncidentAction::Resolve => {
            if incident.dispatcher_id == Some(actor.id) {
                Ok(())
            } else {
                Err(CoreError::Unauthorized(
                    "Only the assigned dispatcher may resolve this incident".to_string(),
                ))
            }
        }
        IncidentAction::Cancel => {
            let is_reporter = incident.reported_by == actor.id;
            let is_eligible_dispatcher = actor.is_dispatcher()
                && incident.dispatcher_id.map_or(true, |assigned| assigned == actor.id);
            if is_reporter || is_eligible_dispatcher || actor.is_admin() {
                Ok(())
            } else {
                Err(CoreError::Unauthorized(
                    "Only the reporter, the responsible dispatcher, or an admin may cancel this incident"
                        .to_string(),
                ))
            }
        }
    }
}

/// Next `updated_at` for a mutation observed at `now`.
///
/// Strictly greater than `previous`, so `(id, updated_at)` identifies one
/// version even when the writer's clock lags the stored value.
pub fn next_updated_at(previous: Timestamp, now: Timestamp) -> Timestamp {
    let floor = previous + chrono::Duration::microseconds(1);
    now.max(floor)
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */
