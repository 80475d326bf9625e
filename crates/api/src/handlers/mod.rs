pub mod chat;
pub mod incidents;
