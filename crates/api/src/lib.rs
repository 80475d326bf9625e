//! Firewatch API server library.
//!
//! Exposes the caller-facing operations (as services) together with the
//! HTTP/WebSocket surface, configuration, and error mapping so integration
//! tests and the binary entrypoint can both use them.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;
