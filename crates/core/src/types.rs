/// All entity and identity ids are UUIDs issued by the record store or the
/// auth provider.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
