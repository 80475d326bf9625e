//! Row-level change envelope shared by the change feed and the
//! synchronization dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::incident::Incident;
use crate::types::{EntityId, Timestamp};

/// Tables observed through the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Incidents,
    ChatMessages,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Incidents => "incidents",
            Table::ChatMessages => "chat_messages",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A record carried by a change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum Record {
    Incident(Incident),
    Message(ChatMessage),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Incident(_) => Table::Incidents,
            Record::Message(_) => Table::ChatMessages,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Record::Incident(i) => i.id,
            Record::Message(m) => m.id,
        }
    }

    /// Version used for deduplication: `updated_at` for incidents,
    /// `created_at` for immutable messages.
    pub fn version(&self) -> Timestamp {
        match self {
            Record::Incident(i) => i.updated_at,
            Record::Message(m) => m.created_at,
        }
    }

    /// Incident the record belongs to. Events sharing a partition key are
    /// processed one at a time, in order.
    pub fn partition_key(&self) -> EntityId {
        match self {
            Record::Incident(i) => i.id,
            Record::Message(m) => m.incident_id,
        }
    }
}

/// One row-level change from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(flatten)]
    pub record: Record,
}

impl ChangeEvent {
    pub fn insert(record: Record) -> Self {
        Self {
            kind: ChangeKind::Insert,
            record,
        }
    }

    pub fn update(record: Record) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
        }
    }

    pub fn delete(record: Record) -> Self {
        Self {
            kind: ChangeKind::Delete,
            record,
        }
    }

    /// Identity of the changed row across tables.
    pub fn key(&self) -> (Table, EntityId) {
        (self.record.table(), self.record.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn message_partitions_by_incident() {
        let incident_id = Uuid::new_v4();
        let record = Record::Message(ChatMessage {
            id: Uuid::new_v4(),
            incident_id,
            sender_id: Uuid::new_v4(),
            message: "ok".into(),
            created_at: chrono::Utc::now(),
        });
        assert_eq!(record.partition_key(), incident_id);
        assert_ne!(record.id(), incident_id);
        assert_eq!(record.table(), Table::ChatMessages);
    }

    #[test]
    fn event_json_shape() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            incident_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            message: "ok".into(),
            created_at: chrono::Utc::now(),
        };
        let event = ChangeEvent::insert(Record::Message(message.clone()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "insert");
        assert_eq!(json["table"], "message");
        assert_eq!(json["record"]["message"], "ok");

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
