//! On-demand aggregation over every stored record.
//!
//! Each call scans the three record prefixes and recomputes everything; there
//! are no cached or incremental counters. The scan is not synchronized with
//! concurrent writers, so a result may miss writes that land mid-scan.

use crate::ingest::{EVENT_PREFIX, PAGEVIEW_PREFIX, SESSION_PREFIX};
use crate::model::{AggregateStats, PageView, Session};
use crate::store::{KvStore, StoreError};
use serde::Serialize;
use serde_json::Value;

/// How many page views the summary echoes back, newest first.
pub const RECENT_PAGE_VIEWS: usize = 10;
/// How many events the summary echoes back, newest first.
pub const RECENT_EVENTS: usize = 10;
/// How many sessions the summary echoes back, newest first.
pub const RECENT_SESSIONS: usize = 5;

/// Scan the store and summarize it.
///
/// Any read failure aborts the whole computation.
pub fn compute_stats(store: &dyn KvStore) -> Result<AggregateStats, StoreError> {
    let page_views = store.get_by_prefix(PAGEVIEW_PREFIX)?;
    let events = store.get_by_prefix(EVENT_PREFIX)?;
    let sessions = store.get_by_prefix(SESSION_PREFIX)?;

    Ok(summarize(page_views, events, sessions))
}

/// Summarize already-fetched record lists (each in insertion order).
pub fn summarize(page_views: Vec<Value>, events: Vec<Value>, sessions: Vec<Value>) -> AggregateStats {
    let session_count = sessions.len();

    let (avg_session_duration, avg_scroll_depth) = if session_count > 0 {
        let n = session_count as f64;
        let total_duration: f64 = sessions.iter().map(|s| number_field(s, "duration")).sum();
        let total_depth: f64 = sessions
            .iter()
            .map(|s| number_field(s, "maxScrollDepth"))
            .sum();
        (
            round_half_up(total_duration / n / 1000.0),
            round_half_up(total_depth / n),
        )
    } else {
        (0, 0)
    };

    let total_interactions = sessions
        .iter()
        .map(|s| number_field(s, "interactions"))
        .sum::<f64>() as i64;

    AggregateStats {
        total_page_views: page_views.len(),
        total_sessions: session_count,
        total_events: events.len(),
        avg_session_duration,
        avg_scroll_depth,
        total_interactions,
        recent_page_views: most_recent(page_views, RECENT_PAGE_VIEWS),
        recent_events: most_recent(events, RECENT_EVENTS),
        sessions: most_recent(sessions, RECENT_SESSIONS),
    }
}

/// Summary built from the agent's offline buffers when the endpoint is
/// unreachable. Events are never buffered locally, so `total_events` is 0.
pub fn summarize_local(page_views: &[PageView], sessions: &[Session]) -> AggregateStats {
    summarize(to_values(page_views), Vec::new(), to_values(sessions))
}

fn to_values<T: Serialize>(items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect()
}

/// Numeric field or 0 when absent, null, or not a number.
fn number_field(record: &Value, field: &str) -> f64 {
    record.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Round to nearest, halves toward positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn most_recent(items: Vec<Value>, limit: usize) -> Vec<Value> {
    items.into_iter().rev().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn session(duration: i64, depth: i64, interactions: i64) -> Value {
        json!({
            "sessionId": format!("s{duration}"),
            "duration": duration,
            "maxScrollDepth": depth,
            "interactions": interactions,
        })
    }

    #[test]
    fn test_session_averages() {
        let sessions = vec![
            session(10_000, 20, 1),
            session(20_000, 60, 2),
            session(30_000, 100, 3),
        ];
        let stats = summarize(Vec::new(), Vec::new(), sessions);

        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.avg_session_duration, 20);
        assert_eq!(stats.avg_scroll_depth, 60);
        assert_eq!(stats.total_interactions, 6);
    }

    #[test]
    fn test_no_sessions_means_zero_averages() {
        let stats = summarize(vec![json!({"path": "/"})], Vec::new(), Vec::new());
        assert_eq!(stats.total_page_views, 1);
        assert_eq!(stats.avg_session_duration, 0);
        assert_eq!(stats.avg_scroll_depth, 0);
        assert_eq!(stats.total_interactions, 0);
    }

    #[test]
    fn test_missing_duration_counts_as_zero() {
        let sessions = vec![
            json!({"sessionId": "a", "duration": 3_000, "maxScrollDepth": 50}),
            json!({"sessionId": "b", "maxScrollDepth": 51, "duration": null}),
        ];
        let stats = summarize(Vec::new(), Vec::new(), sessions);
        // 1.5 s rounds up, 50.5 % rounds up
        assert_eq!(stats.avg_session_duration, 2);
        assert_eq!(stats.avg_scroll_depth, 51);
    }

    #[test]
    fn test_recent_lists_are_bounded_and_newest_first() {
        let page_views: Vec<Value> = (0..15).map(|i| json!({"n": i})).collect();
        let sessions: Vec<Value> = (0..8).map(|i| json!({"n": i})).collect();
        let stats = summarize(page_views, Vec::new(), sessions);

        assert_eq!(stats.recent_page_views.len(), RECENT_PAGE_VIEWS);
        assert_eq!(stats.recent_page_views[0], json!({"n": 14}));
        assert_eq!(stats.recent_page_views[9], json!({"n": 5}));
        assert_eq!(stats.sessions.len(), RECENT_SESSIONS);
        assert_eq!(stats.sessions[0], json!({"n": 7}));
        assert!(stats.recent_events.is_empty());
    }

    #[test]
    fn test_compute_stats_reads_all_prefixes() {
        let store = MemoryStore::new();
        store.set("pageview:1:s", json!({"path": "/"})).unwrap();
        store.set("event:2:s:aaaaaaaaa", json!({"event": "click"})).unwrap();
        store.set("event:3:s:bbbbbbbbb", json!({"event": "click"})).unwrap();
        store.set("session:s", session(4_000, 80, 2)).unwrap();

        let stats = compute_stats(&store).unwrap();
        assert_eq!(stats.total_page_views, 1);
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.avg_session_duration, 4);
        assert_eq!(stats.recent_events[0]["event"], "click");
    }

    #[test]
    fn test_local_summary_has_no_events() {
        let sessions = vec![Session {
            session_id: "s".to_string(),
            start_time: 0,
            end_time: Some(8_000),
            duration: Some(8_000),
            page_views: 1,
            max_scroll_depth: 75,
            interactions: 4,
        }];
        let stats = summarize_local(&[], &sessions);
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.avg_session_duration, 8);
        assert_eq!(stats.avg_scroll_depth, 75);
        assert_eq!(stats.total_interactions, 4);
    }
}
