use std::sync::Arc;

use firewatch_db::RecordStore;
use firewatch_events::SyncDispatcher;

use crate::config::ServerConfig;
use crate::services::{ChatService, IncidentService};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn RecordStore>,
    pub sync: SyncDispatcher,
    pub incidents: Arc<IncidentService>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Wire the services onto one store and dispatcher.
    pub fn new(config: ServerConfig, store: Arc<dyn RecordStore>, sync: SyncDispatcher) -> Self {
        let retry = config.retry;
        Self {
            incidents: Arc::new(IncidentService::new(Arc::clone(&store), retry)),
            chat: Arc::new(ChatService::new(Arc::clone(&store), sync.clone(), retry)),
            config: Arc::new(config),
            store,
            sync,
        }
    }
}
