//! Ingestion of telemetry records into the key-value store.
//!
//! Each record kind lands under its own key prefix:
//!
//! ```text
//! pageview:<server-ms>:<sessionId>
//! event:<server-ms>:<sessionId>:<random9>
//! session:<sessionId>                      (overwritten on every write)
//! ```
//!
//! Page views and events are re-stamped with the server's clock. Sessions are
//! stored exactly as sent, since their `duration` is a client-side delta.

use crate::clock::Clock;
use crate::model::{random_base36, RANDOM_SUFFIX_LEN};
use crate::store::{SharedStore, StoreError};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const PAGEVIEW_PREFIX: &str = "pageview:";
pub const EVENT_PREFIX: &str = "event:";
pub const SESSION_PREFIX: &str = "session:";

/// Key segment used when a record carries no session id.
pub const UNKNOWN_SESSION: &str = "unknown";

pub fn page_view_key(timestamp: i64, session_id: &str) -> String {
    format!("{PAGEVIEW_PREFIX}{timestamp}:{session_id}")
}

pub fn event_key(timestamp: i64, session_id: &str, suffix: &str) -> String {
    format!("{EVENT_PREFIX}{timestamp}:{session_id}:{suffix}")
}

pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

/// Ingestion errors. All of them surface as HTTP 500.
#[derive(Debug)]
pub enum IngestError {
    /// Body is not valid JSON
    Parse(String),
    /// Body is JSON but not an object
    NotAnObject,
    /// The store rejected the write
    Store(StoreError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Parse(e) => write!(f, "Invalid JSON body: {e}"),
            IngestError::NotAnObject => write!(f, "Invalid JSON body: expected an object"),
            IngestError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Store(err)
    }
}

/// Writes incoming records to the store.
pub struct Ingestor {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persist a page view and return its key.
    pub fn record_page_view(&self, body: &[u8]) -> Result<String, IngestError> {
        let mut record = parse_object(body)?;
        let timestamp = self.clock.now_ms();
        let key = page_view_key(timestamp, &session_segment(&record));

        record.insert("timestamp".to_string(), Value::from(timestamp));
        self.store.set(&key, Value::Object(record))?;
        Ok(key)
    }

    /// Persist an interaction event and return its key.
    pub fn record_event(&self, body: &[u8]) -> Result<String, IngestError> {
        let mut record = parse_object(body)?;
        let timestamp = self.clock.now_ms();
        let key = event_key(
            timestamp,
            &session_segment(&record),
            &random_base36(RANDOM_SUFFIX_LEN),
        );

        record.insert("timestamp".to_string(), Value::from(timestamp));
        self.store.set(&key, Value::Object(record))?;
        Ok(key)
    }

    /// Persist (or replace) a session record and return its key.
    pub fn record_session(&self, body: &[u8]) -> Result<String, IngestError> {
        let record = parse_object(body)?;
        let key = session_key(&session_segment(&record));

        self.store.set(&key, Value::Object(record))?;
        Ok(key)
    }
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, IngestError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(IngestError::NotAnObject),
        Err(e) => Err(IngestError::Parse(e.to_string())),
    }
}

/// Session id for the key: top-level `sessionId`, else `data.sessionId`.
fn session_segment(record: &Map<String, Value>) -> String {
    let nested = record
        .get("data")
        .and_then(Value::as_object)
        .and_then(|data| data.get("sessionId"));

    match record.get("sessionId").or(nested) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Null) | None => UNKNOWN_SESSION.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::{KvStore, MemoryStore};
    use serde_json::json;

    fn ingestor(now: i64) -> (Arc<MemoryStore>, Ingestor) {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone(), Arc::new(FixedClock::new(now)));
        (store, ingestor)
    }

    #[test]
    fn test_page_view_gets_server_timestamp() {
        let (store, ingestor) = ingestor(42_000);
        let body = json!({"path": "/", "sessionId": "session_1_abc", "timestamp": 1});

        let key = ingestor
            .record_page_view(body.to_string().as_bytes())
            .unwrap();

        assert_eq!(key, "pageview:42000:session_1_abc");
        let stored = store.get(&key).unwrap().unwrap();
        assert_eq!(stored["timestamp"], 42_000);
        assert_eq!(stored["path"], "/");
    }

    #[test]
    fn test_same_millisecond_events_do_not_collide() {
        let (store, ingestor) = ingestor(7);
        let body = json!({"event": "click", "data": {"sessionId": "s1"}}).to_string();

        let first = ingestor.record_event(body.as_bytes()).unwrap();
        let second = ingestor.record_event(body.as_bytes()).unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("event:7:s1:"));
        assert_eq!(first.len(), "event:7:s1:".len() + RANDOM_SUFFIX_LEN);
        assert_eq!(store.get_by_prefix(EVENT_PREFIX).unwrap().len(), 2);
    }

    #[test]
    fn test_session_is_overwritten_and_keeps_client_fields() {
        let (store, ingestor) = ingestor(99);
        let first = json!({"sessionId": "s1", "startTime": 1, "duration": 500, "interactions": 1});
        let second = json!({"sessionId": "s1", "startTime": 1, "duration": 900, "interactions": 2});

        ingestor.record_session(first.to_string().as_bytes()).unwrap();
        let key = ingestor.record_session(second.to_string().as_bytes()).unwrap();

        assert_eq!(key, "session:s1");
        let sessions = store.get_by_prefix(SESSION_PREFIX).unwrap();
        assert_eq!(sessions, vec![second]);
    }

    #[test]
    fn test_missing_session_id_uses_placeholder() {
        let (_, ingestor) = ingestor(5);
        let key = ingestor.record_page_view(b"{\"path\":\"/about\"}").unwrap();
        assert_eq!(key, "pageview:5:unknown");
    }

    #[test]
    fn test_malformed_bodies_are_rejected() {
        let (store, ingestor) = ingestor(5);
        assert!(matches!(
            ingestor.record_event(b"{not json"),
            Err(IngestError::Parse(_))
        ));
        assert!(matches!(
            ingestor.record_session(b"[1, 2]"),
            Err(IngestError::NotAnObject)
        ));
        assert!(store.is_empty());
    }
}
