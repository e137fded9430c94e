//! Fire-and-forget delivery of agent records.
//!
//! Tracking calls hand records to a [`Dispatcher`], which queues them for a
//! background worker and returns at once. The worker sends each record
//! through a [`Transport`] and applies the fallback policy in
//! [`deliver_with_fallback`] to the result.

use super::storage::LocalBuffers;
use crate::model::{InteractionEvent, PageView, Session};
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A record on its way to the ingestion service.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    PageView(PageView),
    Event(InteractionEvent),
    Session(Session),
}

impl Outgoing {
    pub fn kind(&self) -> &'static str {
        match self {
            Outgoing::PageView(_) => "pageview",
            Outgoing::Event(_) => "event",
            Outgoing::Session(_) => "session",
        }
    }
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Request never got a response
    Network(String),
    /// Server answered with a non-2xx status
    Status { status: u16, message: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "Network error: {msg}"),
            TransportError::Status { status, message } => {
                write!(f, "Collector returned {status}: {message}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends one record to the ingestion service, blocking until it resolves.
pub trait Transport: Send + Sync {
    fn deliver(&self, record: &Outgoing) -> Result<(), TransportError>;
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the server
    Sent,
    /// Not accepted by the server but kept in a local buffer
    Buffered,
    /// Lost
    Dropped,
}

/// Deliver `record`, falling back to the local buffers.
///
/// - page views are buffered only when delivery fails;
/// - sessions are buffered whatever the delivery outcome;
/// - events have no local buffer and are dropped on failure.
pub fn deliver_with_fallback(
    transport: &dyn Transport,
    buffers: &LocalBuffers,
    record: Outgoing,
) -> Delivery {
    let result = transport.deliver(&record);
    if let Err(e) = &result {
        tracing::warn!("Failed to deliver {}: {}", record.kind(), e);
    }

    match record {
        Outgoing::PageView(view) => match result {
            Ok(()) => Delivery::Sent,
            Err(_) => buffer(buffers.page_views.push(view), "page view"),
        },
        Outgoing::Event(_) => match result {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Dropped,
        },
        Outgoing::Session(session) => {
            let buffered = buffer(buffers.sessions.push(session), "session");
            match result {
                Ok(()) => Delivery::Sent,
                Err(_) => buffered,
            }
        }
    }
}

fn buffer(result: Result<(), super::storage::StorageError>, what: &str) -> Delivery {
    match result {
        Ok(()) => Delivery::Buffered,
        Err(e) => {
            tracing::debug!("Could not buffer {} locally: {}", what, e);
            Delivery::Dropped
        }
    }
}

/// Delivery counts reported when a dispatcher shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: u64,
    pub buffered: u64,
    pub dropped: u64,
}

impl DispatchReport {
    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent => self.sent += 1,
            Delivery::Buffered => self.buffered += 1,
            Delivery::Dropped => self.dropped += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.sent + self.buffered + self.dropped
    }
}

/// Queue plus worker thread that performs deliveries off the caller's path.
pub struct Dispatcher {
    sender: Option<Sender<Outgoing>>,
    worker: Option<JoinHandle<DispatchReport>>,
}

impl Dispatcher {
    /// Spawn the delivery worker.
    pub fn spawn(transport: Arc<dyn Transport>, buffers: LocalBuffers) -> Self {
        let (sender, receiver) = unbounded::<Outgoing>();

        let worker = thread::Builder::new()
            .name("telemetry-dispatch".to_string())
            .spawn(move || {
                let mut report = DispatchReport::default();
                for record in receiver.iter() {
                    report.record(deliver_with_fallback(transport.as_ref(), &buffers, record));
                }
                report
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Could not start dispatch worker, telemetry disabled: {}", e);
                None
            }
        };

        Self {
            sender: worker.as_ref().map(|_| sender),
            worker,
        }
    }

    /// Queue `record` for delivery. Never blocks.
    pub fn dispatch(&self, record: Outgoing) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.send(record) {
            tracing::debug!("Dispatch queue closed, dropping {}", e.into_inner().kind());
        }
    }

    /// Stop accepting records, drain the queue and wait for the worker.
    pub fn shutdown(mut self) -> DispatchReport {
        self.sender.take();
        self.worker
            .take()
            .and_then(|worker| worker.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish what is pending and exit.
        self.sender.take();
    }
}
