//! Firewatch domain core.
//!
//! Pure decision logic for the incident lifecycle and its chat channel. This
//! crate performs no I/O: the `db` crate supplies records, the `events`
//! crate fans out changes, and the `api` crate wires both to callers.

pub mod access;
pub mod change;
pub mod chat;
pub mod error;
pub mod filter;
pub mod identity;
pub mod incident;
pub mod lifecycle;
pub mod profile;
pub mod retry;
pub mod roles;
pub mod types;
