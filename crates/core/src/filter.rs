//! Predicates over incidents and chat messages.
//!
//! The same filter values drive store queries (translated to SQL by the
//! `db` crate) and in-process change matching (via `matches`), so a record
//! returned by a query is exactly a record an observer would be sent.

use serde::{Deserialize, Serialize};

use crate::change::Record;
use crate::chat::ChatMessage;
use crate::incident::{Incident, IncidentStatus};
use crate::types::EntityId;

/// Sort direction for queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Conjunction of optional incident constraints. An empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFilter {
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Any-of; empty means every status.
    #[serde(default, alias = "status")]
    pub statuses: Vec<IncidentStatus>,
    #[serde(default)]
    pub reported_by: Option<EntityId>,
    #[serde(default)]
    pub dispatcher_id: Option<EntityId>,
    #[serde(default)]
    pub station_id: Option<EntityId>,
}

impl IncidentFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: IncidentStatus) -> Self {
        if !self.statuses.contains(&status) {
            self.statuses.push(status);
        }
        self
    }

    pub fn reported_by(mut self, identity_id: EntityId) -> Self {
        self.reported_by = Some(identity_id);
        self
    }

    pub fn assigned_to(mut self, identity_id: EntityId) -> Self {
        self.dispatcher_id = Some(identity_id);
        self
    }

    pub fn at_station(mut self, station_id: EntityId) -> Self {
        self.station_id = Some(station_id);
        self
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        holds(self.id, Some(incident.id))
            && (self.statuses.is_empty() || self.statuses.contains(&incident.status))
            && holds(self.reported_by, Some(incident.reported_by))
            && holds(self.dispatcher_id, incident.dispatcher_id)
            && holds(self.station_id, incident.station_id)
    }
}

/// Messages of one incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    pub incident_id: EntityId,
}

impl MessageFilter {
    pub fn for_incident(incident_id: EntityId) -> Self {
        Self { incident_id }
    }

    pub fn matches(&self, message: &ChatMessage) -> bool {
        message.incident_id == self.incident_id
    }
}

/// An observer's subscription predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subscribe", rename_all = "snake_case")]
pub enum Predicate {
    Incidents(IncidentFilter),
    Messages(MessageFilter),
}

impl Predicate {
    /// Whether `record` belongs to this predicate's result set.
    ///
    /// Records of the other table never match.
    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (Predicate::Incidents(f), Record::Incident(i)) => f.matches(i),
            (Predicate::Messages(f), Record::Message(m)) => f.matches(m),
            _ => false,
        }
    }

    pub fn table(&self) -> crate::change::Table {
        match self {
            Predicate::Incidents(_) => crate::change::Table::Incidents,
            Predicate::Messages(_) => crate::change::Table::ChatMessages,
        }
    }
}

/// An unset constraint always holds; a set one requires an equal value.
fn holds(want: Option<EntityId>, have: Option<EntityId>) -> bool {
    want.map_or(true, |w| Some(w) == have)
}
