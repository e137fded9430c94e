//! The tracking agent attached to one page load.

use super::dispatch::{DispatchReport, Dispatcher, Outgoing, Transport};
use super::page::{Element, PageEnvironment, PageSignal, ScrollMetrics, SignalKind};
use super::session::SessionContext;
use super::storage::{LocalBuffers, SharedStorage};
use crate::clock::Clock;
use crate::model::{InteractionEvent, PageView};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Collaborators the agent is built from.
pub struct AgentEnv {
    pub clock: Arc<dyn Clock>,
    /// Tab-scoped storage holding the session id
    pub session_storage: SharedStorage,
    /// Cross-tab storage holding the fallback buffers
    pub local_storage: SharedStorage,
    pub transport: Arc<dyn Transport>,
}

/// Observes one session and reports it.
///
/// None of the reporting methods wait on the network: records are queued for
/// the dispatch worker and the call returns.
pub struct Agent {
    context: SessionContext,
    page: PageEnvironment,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    listeners: HashSet<SignalKind>,
}

impl Agent {
    /// Attach to a freshly loaded page: start the session, register the
    /// signal listeners and report the page view.
    pub fn mount(page: PageEnvironment, env: AgentEnv) -> Self {
        let context = SessionContext::start(env.session_storage.as_ref(), env.clock.as_ref());
        let dispatcher = Dispatcher::spawn(env.transport, LocalBuffers::new(env.local_storage));

        tracing::info!("Tracking session {} on {}", context.session_id(), page.path);

        let mut agent = Self {
            context,
            page,
            clock: env.clock,
            dispatcher,
            listeners: SignalKind::ALL.into_iter().collect(),
        };
        agent.report_page_view();
        agent
    }

    pub fn session_id(&self) -> &str {
        self.context.session_id()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Whether a listener for `kind` is currently registered.
    pub fn is_listening(&self, kind: SignalKind) -> bool {
        self.listeners.contains(&kind)
    }

    /// Route a page signal to its handler. Signals without a registered
    /// listener are ignored.
    pub fn handle(&mut self, signal: PageSignal) {
        if !self.is_listening(signal.kind()) {
            return;
        }
        match signal {
            PageSignal::Scroll(metrics) => self.observe_scroll(metrics),
            PageSignal::Click(target) => self.on_click(&target),
            PageSignal::VisibilityChange { hidden } => self.on_visibility_change(hidden),
            PageSignal::BeforeUnload => self.finalize_session(),
        }
    }

    /// Report the current page load.
    pub fn report_page_view(&mut self) {
        let view = PageView {
            path: self.page.path.clone(),
            referrer: self.page.referrer.clone(),
            timestamp: self.clock.now_ms(),
            session_id: self.context.session_id().to_string(),
            viewport: self.page.viewport,
            user_agent: self.page.user_agent.clone(),
        };
        tracing::debug!("Page view: {}", view.path);
        self.dispatcher.dispatch(Outgoing::PageView(view));
    }

    /// Public alias used by host pages.
    pub fn track_page_view(&mut self) {
        self.report_page_view();
    }

    /// Fold a scroll position into the session, emitting a `scroll_depth`
    /// interaction when a milestone is newly reached.
    pub fn observe_scroll(&mut self, metrics: ScrollMetrics) {
        let Some(percentage) = metrics.percentage() else {
            return;
        };
        if let Some(depth) = self.context.record_scroll(percentage) {
            tracing::debug!("Scroll depth: {}%", depth);
            let mut payload = Map::new();
            payload.insert("depth".to_string(), Value::from(depth));
            self.report_interaction("scroll_depth", payload);
        }
    }

    /// Count and report an interaction of `kind`.
    pub fn report_interaction(&mut self, kind: &str, mut payload: Map<String, Value>) {
        self.context.record_interaction();
        payload.insert(
            "sessionId".to_string(),
            Value::from(self.context.session_id()),
        );

        let event = InteractionEvent {
            event: kind.to_string(),
            timestamp: self.clock.now_ms(),
            data: payload,
        };
        tracing::debug!("Interaction: {}", event.event);
        self.dispatcher.dispatch(Outgoing::Event(event));
    }

    /// Public alias used by host pages.
    pub fn track_event(&mut self, kind: &str, payload: Map<String, Value>) {
        self.report_interaction(kind, payload);
    }

    /// Report a click when it landed on (or inside) a link or button.
    pub fn on_click(&mut self, target: &Element) {
        if let Some(element) = target.closest_interactive() {
            let payload = element.click_payload();
            self.report_interaction("click", payload);
        }
    }

    /// Visibility changes are only logged; timers keep running.
    pub fn on_visibility_change(&self, hidden: bool) {
        if hidden {
            tracing::debug!("Page hidden");
        } else {
            tracing::debug!("Page visible");
        }
    }

    /// Report the session record as of now.
    ///
    /// Calling this more than once sends a newer record for the same
    /// session id, which replaces the earlier one server-side.
    pub fn finalize_session(&mut self) {
        let session = self.context.finalize(self.clock.now_ms());
        tracing::debug!(
            "Session end: {} after {} ms",
            session.session_id,
            session.duration.unwrap_or_default()
        );
        self.dispatcher.dispatch(Outgoing::Session(session));
    }

    /// Unregister every listener. Later signals are ignored; direct calls
    /// still report.
    pub fn detach(&mut self) {
        self.listeners.clear();
    }

    /// Detach and wait for queued deliveries to finish.
    pub fn teardown(mut self) -> DispatchReport {
        self.detach();
        let report = self.dispatcher.shutdown();
        tracing::info!(
            "Session {} detached: {} sent, {} buffered, {} dropped",
            self.context.session_id(),
            report.sent,
            report.buffered,
            report.dropped
        );
        report
    }
}
