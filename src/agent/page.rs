//! What the host page tells the agent: its environment at load time and the
//! signals it forwards afterwards.

use crate::model::Viewport;
use serde_json::{Map, Value};

/// Maximum characters of link/button text captured on click.
pub const CLICK_TEXT_LIMIT: usize = 50;

/// The page as seen at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEnvironment {
    pub path: String,
    pub referrer: String,
    pub viewport: Viewport,
    pub user_agent: String,
}

impl PageEnvironment {
    pub fn new(path: impl Into<String>, viewport: Viewport, user_agent: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            referrer: String::new(),
            viewport,
            user_agent: user_agent.into(),
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    /// Environment for a native (non-browser) host, identified by hostname.
    pub fn native(path: impl Into<String>, viewport: Viewport) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let user_agent = format!("visit-telemetry/{} ({hostname})", env!("CARGO_PKG_VERSION"));
        Self::new(path, viewport, user_agent)
    }
}

/// Scroll position of the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, viewport_height: f64, document_height: f64) -> Self {
        Self {
            scroll_top,
            viewport_height,
            document_height,
        }
    }

    /// Share of the document that has been on screen, rounded to a whole
    /// percent. `None` when the document has no height.
    pub fn percentage(&self) -> Option<u32> {
        if self.document_height <= 0.0 {
            return None;
        }
        let ratio = (self.scroll_top + self.viewport_height) / self.document_height * 100.0;
        Some((ratio + 0.5).floor().max(0.0) as u32)
    }
}

/// A clicked DOM element and its ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    /// Full text content, descendants included
    pub text: String,
    pub href: Option<String>,
    pub parent: Option<Box<Element>>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            text: String::new(),
            href: None,
            parent: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Nest this element inside `parent`.
    pub fn inside(mut self, parent: Element) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// This element or its nearest ancestor that is a link or button.
    pub fn closest_interactive(&self) -> Option<&Element> {
        let mut current = Some(self);
        while let Some(element) = current {
            let tag = element.tag.as_str();
            if tag.eq_ignore_ascii_case("a") || tag.eq_ignore_ascii_case("button") {
                return Some(element);
            }
            current = element.parent.as_deref();
        }
        None
    }

    /// Payload for a `click` interaction on this element.
    pub fn click_payload(&self) -> Map<String, Value> {
        let text: String = self.text.trim().chars().take(CLICK_TEXT_LIMIT).collect();

        let mut payload = Map::new();
        payload.insert("element".to_string(), Value::from(self.tag.to_lowercase()));
        payload.insert("text".to_string(), Value::from(text));
        if let Some(href) = &self.href {
            payload.insert("href".to_string(), Value::from(href.clone()));
        }
        payload
    }
}

/// Kinds of page signal the agent can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Scroll,
    Click,
    VisibilityChange,
    BeforeUnload,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Scroll,
        SignalKind::Click,
        SignalKind::VisibilityChange,
        SignalKind::BeforeUnload,
    ];
}

/// A signal forwarded from the host page's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PageSignal {
    Scroll(ScrollMetrics),
    Click(Element),
    VisibilityChange { hidden: bool },
    BeforeUnload,
}

impl PageSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            PageSignal::Scroll(_) => SignalKind::Scroll,
            PageSignal::Click(_) => SignalKind::Click,
            PageSignal::VisibilityChange { .. } => SignalKind::VisibilityChange,
            PageSignal::BeforeUnload => SignalKind::BeforeUnload,
        }
    }
}
