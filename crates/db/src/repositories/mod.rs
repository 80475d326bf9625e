//! Repository layer: one struct per table, each method a single statement.

pub mod chat_message_repo;
pub mod dispatcher_repo;
pub mod incident_repo;
pub mod profile_repo;

pub use chat_message_repo::ChatMessageRepo;
pub use dispatcher_repo::DispatcherRepo;
pub use incident_repo::IncidentRepo;
pub use profile_repo::ProfileRepo;
