//! Client tracking agent.
//!
//! One [`Agent`] is mounted per page load. It owns the [`SessionContext`]
//! for the tab, turns page signals (scrolls, clicks, unload) into telemetry
//! records, and hands them to a background [`Dispatcher`] so the host never
//! waits on the network. Failed deliveries fall back to bounded buffers in
//! local storage.

pub mod dispatch;
pub mod page;
pub mod session;
pub mod storage;
pub mod tracker;

// Re-export commonly used types
pub use dispatch::{
    deliver_with_fallback, Delivery, DispatchReport, Dispatcher, Outgoing, Transport,
    TransportError,
};
pub use page::{Element, PageEnvironment, PageSignal, ScrollMetrics, SignalKind};
pub use session::{get_or_create_session_id, SessionContext, SCROLL_MILESTONES};
pub use storage::{
    BrowserStorage, FileStorage, LocalBuffers, MemoryStorage, RingBuffer, SharedStorage,
    StorageError,
};
pub use tracker::{Agent, AgentEnv};
