//! Per-tab session identity and the counters accumulated over its life.

use super::storage::BrowserStorage;
use crate::clock::Clock;
use crate::model::{random_base36, Session, RANDOM_SUFFIX_LEN};

/// Session-storage key of the tab's session id.
pub const SESSION_ID_KEY: &str = "analytics_session_id";

/// Scroll depths (percent) that emit a `scroll_depth` interaction.
pub const SCROLL_MILESTONES: [u32; 5] = [25, 50, 75, 90, 100];

/// Fresh id of the form `session_<epoch-ms>_<random9>`.
pub fn generate_session_id(now_ms: i64) -> String {
    format!("session_{now_ms}_{}", random_base36(RANDOM_SUFFIX_LEN))
}

/// Return the tab's session id, creating and storing one if the slot is empty.
///
/// When storage is unavailable the new id lives only as long as the caller
/// keeps it.
pub fn get_or_create_session_id(storage: &dyn BrowserStorage, clock: &dyn Clock) -> String {
    match storage.get_item(SESSION_ID_KEY) {
        Ok(Some(id)) if !id.is_empty() => return id,
        Ok(_) => {}
        Err(e) => tracing::debug!("Session storage unreadable: {}", e),
    }

    let id = generate_session_id(clock.now_ms());
    if let Err(e) = storage.set_item(SESSION_ID_KEY, &id) {
        tracing::debug!("Keeping session id in memory only: {}", e);
    }
    id
}

/// Everything the agent knows about the current session.
///
/// Built once when the agent mounts and threaded through every tracking call.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    session_id: String,
    start_time: i64,
    max_scroll_depth: u32,
    interactions: u32,
}

impl SessionContext {
    /// Start a session now, reusing the tab's id if it has one.
    pub fn start(storage: &dyn BrowserStorage, clock: &dyn Clock) -> Self {
        Self {
            session_id: get_or_create_session_id(storage, clock),
            start_time: clock.now_ms(),
            max_scroll_depth: 0,
            interactions: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn max_scroll_depth(&self) -> u32 {
        self.max_scroll_depth
    }

    pub fn interactions(&self) -> u32 {
        self.interactions
    }

    /// Fold a scroll reading into the running maximum.
    ///
    /// Returns the milestone when this reading raised the maximum to exactly
    /// one of [`SCROLL_MILESTONES`]. Because the maximum only grows, each
    /// milestone is returned at most once per session.
    pub fn record_scroll(&mut self, percentage: u32) -> Option<u32> {
        if percentage <= self.max_scroll_depth {
            return None;
        }
        self.max_scroll_depth = percentage;
        SCROLL_MILESTONES.contains(&percentage).then_some(percentage)
    }

    /// Count one interaction and return the new total.
    pub fn record_interaction(&mut self) -> u32 {
        self.interactions += 1;
        self.interactions
    }

    /// The session record as of `now_ms`.
    pub fn finalize(&self, now_ms: i64) -> Session {
        Session {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            end_time: Some(now_ms),
            duration: Some(now_ms - self.start_time),
            page_views: 1,
            max_scroll_depth: self.max_scroll_depth,
            interactions: self.interactions,
        }
    }
}
