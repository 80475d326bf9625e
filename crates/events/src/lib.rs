//! Realtime synchronization for Firewatch.
//!
//! [`SyncDispatcher`] consumes the store's change feed and fans row changes
//! out to registered observers (dashboards, history lists, open chats):
//!
//! - events are routed to shards by incident id, so changes to one incident
//!   are handled one at a time and in order;
//! - each observer keeps per-record version marks, so duplicates and stale
//!   snapshots are dropped;
//! - a record that stops matching an observer's predicate is delivered as a
//!   [`Delivery::Remove`];
//! - a feed disconnect triggers a full resynchronization of every observer.

pub mod delivery;
pub mod dispatcher;
pub mod observer;
mod shard;

pub use delivery::{Callback, Delivery};
pub use dispatcher::{SubscriptionHandle, SyncConfig, SyncDispatcher, SyncError};
pub use observer::SubscriptionId;
