//! Visit Telemetry - page-visit tracking with a collector and stats endpoint.
//!
//! A browser-side [`agent`] follows one page load as a *session*: it reports
//! the page view, scroll-depth milestones, clicks on links and buttons, and a
//! final session record on unload. Records travel over HTTP to the
//! collector [`server`], which writes them into a key-value [`store`] and
//! answers aggregate queries over everything recorded so far.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  POST /analytics/*  ┌──────────────┐   set    ┌───────────┐
//! │    Agent     │────────────────────▶│    Ingest    │─────────▶│  KvStore  │
//! │ (page load)  │                     └──────────────┘          │ (prefix   │
//! └──────┬───────┘                     ┌──────────────┐  scan    │  scans)   │
//!        │ on failure                  │  Aggregate   │◀─────────│           │
//!        ▼                             └──────┬───────┘          └───────────┘
//! ┌──────────────┐                            │ GET /analytics/stats
//! │ Local ring   │                            ▼
//! │   buffers    │                        dashboard
//! └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use visit_telemetry::agent::{Agent, AgentEnv, MemoryStorage, PageEnvironment, PageSignal};
//! use visit_telemetry::client::{BlockingTelemetryClient, EndpointConfig};
//! use visit_telemetry::clock::SystemClock;
//! use visit_telemetry::model::Viewport;
//!
//! let client = BlockingTelemetryClient::new(EndpointConfig::new("http://127.0.0.1:8787", None))
//!     .expect("Failed to create client");
//! let env = AgentEnv {
//!     clock: Arc::new(SystemClock),
//!     session_storage: Arc::new(MemoryStorage::new()),
//!     local_storage: Arc::new(MemoryStorage::new()),
//!     transport: Arc::new(client),
//! };
//! let page = PageEnvironment::native("/", Viewport { width: 1280, height: 800 });
//!
//! let mut agent = Agent::mount(page, env);
//! agent.handle(PageSignal::BeforeUnload);
//! agent.teardown();
//! ```

pub mod agent;
pub mod aggregate;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod model;
pub mod store;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use agent::{Agent, AgentEnv, PageEnvironment, PageSignal, SessionContext};
pub use aggregate::{compute_stats, summarize_local};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, ConfigError};
pub use ingest::{IngestError, Ingestor};
pub use model::{AggregateStats, InteractionEvent, PageView, Session, Viewport, WriteResponse};
pub use store::{FileStore, KvStore, MemoryStore, SharedStore, StoreError};

#[cfg(feature = "client")]
pub use client::{BlockingTelemetryClient, ClientError, EndpointConfig, TelemetryClient};

#[cfg(feature = "server")]
pub use server::{ServerConfig, StorageBackend};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
