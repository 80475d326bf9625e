//! WebSocket surface for realtime subscriptions.
//!
//! A connection may hold any number of subscriptions. Incident
//! subscriptions forward sync deliveries as they are; message subscriptions
//! are opened as chat sessions, so they are access checked and lock when
//! the incident closes.

mod handler;
mod protocol;

pub use handler::ws_handler;
pub use protocol::{ClientRequest, ServerMessage};
