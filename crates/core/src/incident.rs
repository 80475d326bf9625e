//! Incident record, status values, and report validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

/* --------------------------------------------------------------------------
Constants
-------------------------------------------------------------------------- */

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_RESOLVED: &str = "resolved";
pub const STATUS_CANCELLED: &str = "cancelled";

/// All valid priority values, lowest first.
pub const VALID_PRIORITIES: &[&str] = &["low", "medium", "high", "critical"];

/// Priority assigned when a report omits one.
pub const DEFAULT_PRIORITY: &str = "medium";

/// Maximum length of an incident description.
pub const MAX_DESCRIPTION_LENGTH: usize = 5_000;

/// Maximum number of media attachments per report.
pub const MAX_MEDIA_URLS: usize = 10;

/* --------------------------------------------------------------------------
Status
-------------------------------------------------------------------------- */

/// Persisted incident status.
///
/// `approved` is not a status: approval moves a pending incident straight to
/// [`IncidentStatus::InProgress`] (see [`crate::lifecycle`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    InProgress,
    Resolved,
    Cancelled,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 4] = [
        IncidentStatus::Pending,
        IncidentStatus::InProgress,
        IncidentStatus::Resolved,
        IncidentStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Pending => STATUS_PENDING,
            IncidentStatus::InProgress => STATUS_IN_PROGRESS,
            IncidentStatus::Resolved => STATUS_RESOLVED,
            IncidentStatus::Cancelled => STATUS_CANCELLED,
        }
    }

    /// Terminal states accept no further transitions and close the chat.
    pub fn is_terminal(self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Cancelled)
    }

    /// Whether an incident in this state must have a dispatcher assigned.
    pub fn requires_dispatcher(self) -> bool {
        matches!(self, IncidentStatus::InProgress | IncidentStatus::Resolved)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATUS_PENDING => Ok(IncidentStatus::Pending),
            STATUS_IN_PROGRESS => Ok(IncidentStatus::InProgress),
            STATUS_RESOLVED => Ok(IncidentStatus::Resolved),
            STATUS_CANCELLED => Ok(IncidentStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "Invalid incident status '{other}'"
            ))),
        }
    }
}

/* --------------------------------------------------------------------------
Records
-------------------------------------------------------------------------- */

/// An incident snapshot as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: EntityId,
    pub status: IncidentStatus,
    pub reported_by: EntityId,
    pub dispatcher_id: Option<EntityId>,
    pub station_id: Option<EntityId>,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub description: String,
    pub priority: String,
    /// Raw `lat,lng` string or a street address.
    pub location: String,
    pub media_urls: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Incident {
    /// Check the record-level invariant: an incident that is in progress or
    /// resolved always names its dispatcher.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.status.requires_dispatcher() && self.dispatcher_id.is_none() {
            return Err(CoreError::Internal(format!(
                "Incident {} is {} without an assigned dispatcher",
                self.id, self.status
            )));
        }
        if self.updated_at < self.created_at {
            return Err(CoreError::Internal(format!(
                "Incident {} was updated before it was created",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether `identity_id` is the reporter or the assigned dispatcher.
    pub fn is_participant(&self, identity_id: EntityId) -> bool {
        self.reported_by == identity_id || self.dispatcher_id == Some(identity_id)
    }
}

/// DTO for reporting a new incident.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIncident {
    pub reported_by: EntityId,
    pub station_id: Option<EntityId>,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub description: String,
    pub priority: Option<String>,
    pub location: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

impl NewIncident {
    /// Validate and normalize a report before it is stored.
    pub fn validate(mut self) -> Result<Self, CoreError> {
        self.incident_type = self.incident_type.trim().to_string();
        self.description = self.description.trim().to_string();
        self.location = self.location.trim().to_string();

        if self.incident_type.is_empty() {
            return Err(CoreError::Validation(
                "Incident type must not be empty".to_string(),
            ));
        }
        if self.description.is_empty() {
            return Err(CoreError::Validation(
                "Incident description must not be empty".to_string(),
            ));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(CoreError::Validation(format!(
                "Incident description exceeds maximum length of {MAX_DESCRIPTION_LENGTH} characters"
            )));
        }
        if self.location.is_empty() {
            return Err(CoreError::Validation(
                "Incident location must not be empty".to_string(),
            ));
        }
        validate_priority(self.priority.as_deref().unwrap_or(DEFAULT_PRIORITY))?;
        if self.media_urls.len() > MAX_MEDIA_URLS {
            return Err(CoreError::Validation(format!(
                "At most {MAX_MEDIA_URLS} media attachments are allowed"
            )));
        }
        if let Some(bad) = self.media_urls.iter().find(|u| !looks_like_url(u)) {
            return Err(CoreError::Validation(format!("Invalid media URL '{bad}'")));
        }
        Ok(self)
    }

    /// The incident row this report produces, with status `pending`.
    pub fn into_incident(self, id: EntityId, now: Timestamp) -> Incident {
        Incident {
            id,
            status: IncidentStatus::Pending,
            reported_by: self.reported_by,
            dispatcher_id: None,
            station_id: self.station_id,
            incident_type: self.incident_type,
            description: self.description,
            priority: self.priority.unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            location: self.location,
            media_urls: self.media_urls,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validate that a priority string is one of the accepted values.
pub fn validate_priority(priority: &str) -> Result<(), CoreError> {
    if VALID_PRIORITIES.contains(&priority) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid priority '{priority}'. Must be one of: {}",
            VALID_PRIORITIES.join(", ")
        )))
    }
}

fn looks_like_url(url: &str) -> bool {
    (url.starts_with("https://") || url.starts_with("http://")) && !url.contains(char::is_whitespace)
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn report() -> NewIncident {
        NewIncident {
            reported_by: Uuid::new_v4(),
            station_id: None,
            incident_type: " fire ".into(),
            description: "Smoke from the warehouse roof".into(),
            priority: None,
            location: "14.5995,120.9842".into(),
            media_urls: vec!["https://cdn.example.com/a.jpg".into()],
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in IncidentStatus::ALL {
            assert_eq!(status.as_str().parse::<IncidentStatus>().unwrap(), status);
        }
        assert!("approved".parse::<IncidentStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(IncidentStatus::Resolved.is_terminal());
        assert!(IncidentStatus::Cancelled.is_terminal());
        assert!(!IncidentStatus::Pending.is_terminal());
        assert!(!IncidentStatus::InProgress.is_terminal());
    }

    #[test]
    fn valid_report_is_trimmed_and_defaults_priority() {
        let incident = report()
            .validate()
            .unwrap()
            .into_incident(Uuid::new_v4(), chrono::Utc::now());
        assert_eq!(incident.incident_type, "fire");
        assert_eq!(incident.priority, DEFAULT_PRIORITY);
        assert_eq!(incident.status, IncidentStatus::Pending);
        assert!(incident.dispatcher_id.is_none());
        assert_eq!(incident.created_at, incident.updated_at);
    }

    #[test]
    fn blank_description_rejected() {
        let mut r = report();
        r.description = "   ".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn unknown_priority_rejected() {
        let mut r = report();
        r.priority = Some("urgent".into());
        let err = r.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid priority"));
    }

    #[test]
    fn non_http_media_rejected() {
        let mut r = report();
        r.media_urls = vec!["file:///etc/passwd".into()];
        assert!(r.validate().is_err());
    }

    #[test]
    fn in_progress_without_dispatcher_violates_invariant() {
        let mut incident = report()
            .validate()
            .unwrap()
            .into_incident(Uuid::new_v4(), chrono::Utc::now());
        incident.status = IncidentStatus::InProgress;
        assert!(incident.check_invariants().is_err());
        incident.dispatcher_id = Some(Uuid::new_v4());
        assert!(incident.check_invariants().is_ok());
    }

    #[test]
    fn serializes_type_field_name() {
        let incident = report()
            .validate()
            .unwrap()
            .into_incident(Uuid::new_v4(), chrono::Utc::now());
        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["type"], "fire");
        assert_eq!(json["status"], "pending");
    }
}
