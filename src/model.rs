//! Telemetry record types shared by the agent, the ingestion handlers and
//! the aggregation endpoint.
//!
//! Field names follow the JSON wire format (camelCase). Timestamps are epoch
//! milliseconds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Length of the random suffix used in session ids and event keys.
pub const RANDOM_SUFFIX_LEN: usize = 9;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Browser viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One page load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub path: String,
    pub referrer: String,
    pub timestamp: i64,
    pub session_id: String,
    pub viewport: Viewport,
    pub user_agent: String,
}

/// A named interaction with a free-form payload.
///
/// The agent always stamps `sessionId` into `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub event: String,
    pub timestamp: i64,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl InteractionEvent {
    /// The session this event was attributed to, if the payload carries one.
    pub fn session_id(&self) -> Option<&str> {
        self.data.get("sessionId").and_then(Value::as_str)
    }
}

/// The canonical record of one browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub page_views: u32,
    pub max_scroll_depth: u32,
    pub interactions: u32,
}

/// Summary over every stored record. Computed per request, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_page_views: usize,
    pub total_sessions: usize,
    pub total_events: usize,
    /// Mean session duration in whole seconds
    pub avg_session_duration: i64,
    /// Mean of per-session maximum scroll depth, in percent
    pub avg_scroll_depth: i64,
    pub total_interactions: i64,
    #[serde(default)]
    pub recent_page_views: Vec<Value>,
    #[serde(default)]
    pub recent_events: Vec<Value>,
    #[serde(default)]
    pub sessions: Vec<Value>,
}

/// Body returned by every write endpoint and by failed reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Random lowercase base-36 token of `len` characters.
pub fn random_base36(len: usize) -> String {
    let mut bits = uuid::Uuid::new_v4().as_u128();
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        if bits == 0 {
            bits = uuid::Uuid::new_v4().as_u128();
        }
        out.push(BASE36[(bits % 36) as usize] as char);
        bits /= 36;
    }
    out
}
