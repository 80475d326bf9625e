#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use firewatch_api::auth::jwt::{generate_access_token, JwtConfig};
use firewatch_api::config::{ServerConfig, DEFAULT_OBSERVER_BUFFER};
use firewatch_api::router::build_app_router;
use firewatch_api::state::AppState;
use firewatch_core::identity::{Dispatcher, Identity};
use firewatch_core::incident::{Incident, NewIncident};
use firewatch_core::retry::RetryPolicy;
use firewatch_core::roles::Role;
use firewatch_db::{ChangeFeed, MemoryStore, RecordStore};
use firewatch_events::{SyncConfig, SyncDispatcher};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

/// Build a test `ServerConfig` with safe defaults and no retry delays.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8081".to_string()],
        request_timeout_secs: 30,
        database_url: "postgres://unused".to_string(),
        jwt: JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expiry_mins: 5,
        },
        retry: RetryPolicy::immediate(3),
        sync_shards: 4,
        sync_observer_buffer: DEFAULT_OBSERVER_BUFFER,
    }
}

/// An application wired onto a [`MemoryStore`].
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub config: ServerConfig,
    pub cancel: CancellationToken,
}

impl TestApp {
    /// The full router, with the production middleware stack.
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone(), &self.config)
    }

    /// Bearer token for `identity`.
    pub fn token(&self, identity: &Identity) -> String {
        generate_access_token(
            identity.id,
            &identity.email,
            identity.role.as_str(),
            &self.config.jwt,
        )
        .unwrap()
    }

    /// A reporter with a fresh identity.
    pub fn reporter(&self) -> Identity {
        let id = Uuid::new_v4();
        Identity::new(id, format!("reporter-{id}@example.com"), Role::User)
            .with_full_name("Rita Reporter")
    }

    /// Provision an active dispatcher row and return its identity.
    pub async fn dispatcher(&self, station_id: Option<Uuid>) -> Identity {
        let user_id = Uuid::new_v4();
        let row = Dispatcher {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            email: format!("dispatch-{user_id}@example.com"),
            full_name: Some("Dana Dispatch".to_string()),
            station_id,
            region: Some("north".to_string()),
            is_active: true,
            created_at: Utc::now(),
        };
        self.store.add_dispatcher(row.clone()).await;
        Identity::from_dispatcher(&row).unwrap()
    }

    /// Report a pending incident as `reporter`.
    pub async fn report(&self, reporter: &Identity) -> Incident {
        self.state
            .incidents
            .report(reporter, new_incident(reporter.id))
            .await
            .unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub async fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let record_store: Arc<dyn RecordStore> = store.clone();
    let feed: Arc<dyn ChangeFeed> = store.clone();
    let cancel = CancellationToken::new();

    let sync = SyncDispatcher::start(
        Arc::clone(&record_store),
        feed,
        SyncConfig {
            shards: config.sync_shards,
            shard_buffer: 64,
            retry: config.retry,
        },
        cancel.clone(),
    )
    .await
    .unwrap();

    let state = AppState::new(config.clone(), record_store, sync);
    TestApp {
        store,
        state,
        config,
        cancel,
    }
}

pub fn new_incident(reported_by: Uuid) -> NewIncident {
    NewIncident {
        reported_by,
        station_id: None,
        incident_type: "fire".to_string(),
        description: "Kitchen fire on the second floor".to_string(),
        priority: Some("high".to_string()),
        location: "51.5072,-0.1276".to_string(),
        media_urls: vec![],
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str, token: Option<&str>) -> Response {
    send(app, Method::GET, uri, token, None).await
}

pub async fn post_json(
    app: Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response {
    send(app, Method::POST, uri, token, Some(body)).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
