//! HTTP surface for ingestion and aggregation.
//!
//! # Routes
//!
//! ```text
//! GET  /health              liveness, never touches the store
//! POST /analytics/pageview  ──→ pageview:<ms>:<sessionId>
//! POST /analytics/event     ──→ event:<ms>:<sessionId>:<random9>
//! POST /analytics/session   ──→ session:<sessionId>   (replaced)
//! GET  /analytics/stats     ──→ full prefix scan + summary
//! ```
//!
//! Every `/analytics` route requires `Authorization: Bearer <token>` when a
//! token is configured. CORS is open to any origin.

use crate::aggregate::compute_stats;
use crate::clock::{Clock, SystemClock};
use crate::ingest::{IngestError, Ingestor};
use crate::model::{AggregateStats, WriteResponse};
use crate::store::{FileStore, MemoryStore, SharedStore};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Where the server keeps its records.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Lost on restart
    Memory,
    /// Append-only log at the given path
    File(PathBuf),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Shared bearer token; `None` accepts unauthenticated requests
    pub auth_token: Option<String>,
    /// Record storage
    pub storage: StorageBackend,
}

impl ServerConfig {
    /// Create a new server configuration bound to localhost.
    pub fn new(port: u16, auth_token: Option<String>, storage: StorageBackend) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            auth_token,
            storage,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Open the configured store.
    pub fn open_store(&self) -> anyhow::Result<SharedStore> {
        let store: SharedStore = match &self.storage {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::File(path) => Arc::new(FileStore::open(path)?),
        };
        Ok(store)
    }
}

/// Shared server state
pub struct ServerState {
    store: SharedStore,
    ingestor: Ingestor,
    auth_token: Option<String>,
}

impl ServerState {
    /// Create new server state
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>, auth_token: Option<String>) -> Self {
        Self {
            ingestor: Ingestor::new(store.clone(), clock),
            store,
            auth_token,
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

type Failure = (StatusCode, Json<WriteResponse>);

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /analytics/pageview
async fn record_page_view(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    write_response(state.ingestor.record_page_view(&body), "page view")
}

/// POST /analytics/event
async fn record_event(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    write_response(state.ingestor.record_event(&body), "event")
}

/// POST /analytics/session
async fn record_session(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    write_response(state.ingestor.record_session(&body), "session")
}

/// GET /analytics/stats
async fn stats(State(state): State<Arc<ServerState>>) -> Result<Json<AggregateStats>, Failure> {
    compute_stats(state.store.as_ref()).map(Json).map_err(|e| {
        tracing::error!("Error fetching analytics stats: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WriteResponse::failed(e.to_string())),
        )
    })
}

fn write_response(result: Result<String, IngestError>, what: &str) -> Response {
    match result {
        Ok(key) => {
            tracing::info!("Tracked {}: {}", what, key);
            Json(WriteResponse::ok()).into_response()
        }
        Err(e) => {
            tracing::error!("Error tracking {}: {}", what, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WriteResponse::failed(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Reject requests without the configured bearer token.
async fn require_bearer(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.auth_token {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        if provided != Some(expected.as_str()) {
            tracing::warn!("Rejected {} {}: bad credentials", request.method(), request.uri());
            return (
                StatusCode::UNAUTHORIZED,
                Json(WriteResponse::failed("Missing or invalid bearer token")),
            )
                .into_response();
        }
    }
    next.run(request).await
}

/// Build the router over `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    let analytics = Router::new()
        .route("/analytics/pageview", post(record_page_view))
        .route("/analytics/event", post(record_event))
        .route("/analytics/session", post(record_session))
        .route("/analytics/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(analytics)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .expose_headers([header::CONTENT_LENGTH])
                .max_age(Duration::from_secs(600)),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let store = config.open_store()?;
    run_with_store(config, store).await
}

/// Run the HTTP server over an already opened store.
pub async fn run_with_store(
    config: ServerConfig,
    store: SharedStore,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    if config.auth_token.is_none() {
        tracing::warn!("No auth token configured, accepting unauthenticated requests");
    }
    let state = Arc::new(ServerState::new(
        store,
        Arc::new(SystemClock),
        config.auth_token.clone(),
    ));
    let app = router(state);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Telemetry collector listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
