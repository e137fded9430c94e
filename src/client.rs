//! HTTP client for the collector endpoints.
//!
//! Used by the agent (through [`Transport`]) to deliver records and by the
//! CLI to read aggregate stats.

use crate::agent::{Outgoing, Transport, TransportError};
use crate::model::{AggregateStats, InteractionEvent, PageView, Session};
use serde::Serialize;
use std::time::Duration;

/// Collector endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL, e.g. `http://127.0.0.1:8787`
    pub base_url: String,
    /// Shared bearer token, if the collector requires one
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl EndpointConfig {
    /// Create a new endpoint configuration.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub fn page_view_url(&self) -> String {
        format!("{}/analytics/pageview", self.base_url)
    }

    pub fn event_url(&self) -> String {
        format!("{}/analytics/event", self.base_url)
    }

    pub fn session_url(&self) -> String {
        format!("{}/analytics/session", self.base_url)
    }

    pub fn stats_url(&self) -> String {
        format!("{}/analytics/stats", self.base_url)
    }
}

/// Client error types.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Config(msg) => write!(f, "Client config error: {msg}"),
            ClientError::Network(msg) => write!(f, "Collector network error: {msg}"),
            ClientError::Server { status, message } => {
                write!(f, "Collector server error ({status}): {message}")
            }
            ClientError::Serialization(msg) => write!(f, "Collector serialization error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ClientError> for TransportError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Server { status, message } => TransportError::Status { status, message },
            other => TransportError::Network(other.to_string()),
        }
    }
}

/// Async client for the collector.
pub struct TelemetryClient {
    config: EndpointConfig,
    client: reqwest::Client,
}

impl TelemetryClient {
    /// Create a new client.
    pub fn new(config: EndpointConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Test connection to the collector.
    pub async fn test_connection(&self) -> Result<bool, ClientError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    pub async fn post_page_view(&self, view: &PageView) -> Result<(), ClientError> {
        self.post(&self.config.page_view_url(), view).await
    }

    pub async fn post_event(&self, event: &InteractionEvent) -> Result<(), ClientError> {
        self.post(&self.config.event_url(), event).await
    }

    pub async fn post_session(&self, session: &Session) -> Result<(), ClientError> {
        self.post(&self.config.session_url(), session).await
    }

    /// Deliver any agent record to its endpoint.
    pub async fn send(&self, record: &Outgoing) -> Result<(), ClientError> {
        match record {
            Outgoing::PageView(view) => self.post_page_view(view).await,
            Outgoing::Event(event) => self.post_event(event).await,
            Outgoing::Session(session) => self.post_session(session).await,
        }
    }

    /// Fetch the aggregate stats document.
    pub async fn fetch_stats(&self) -> Result<AggregateStats, ClientError> {
        let mut request = self.client.get(self.config.stats_url());
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }

    async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<(), ClientError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Blocking client for use in synchronous contexts such as the agent's
/// dispatch worker and the CLI.
pub struct BlockingTelemetryClient {
    inner: TelemetryClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingTelemetryClient {
    /// Create a new blocking client.
    pub fn new(config: EndpointConfig) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: TelemetryClient::new(config)?,
            runtime,
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        self.inner.config()
    }

    pub fn test_connection(&self) -> Result<bool, ClientError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    pub fn send(&self, record: &Outgoing) -> Result<(), ClientError> {
        self.runtime.block_on(self.inner.send(record))
    }

    pub fn fetch_stats(&self) -> Result<AggregateStats, ClientError> {
        self.runtime.block_on(self.inner.fetch_stats())
    }
}

impl Transport for BlockingTelemetryClient {
    fn deliver(&self, record: &Outgoing) -> Result<(), TransportError> {
        self.send(record).map_err(TransportError::from)
    }
}
