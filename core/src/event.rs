//! Timing and outcome events.
//!
//! # Design
//! Events are fire-and-forget: `Events::emit` hands each event to every
//! configured sink and never lets a sink failure reach the dispatch path.
//! A panicking sink is caught and reported through `tracing`.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A response came back from the transport.
    Requested,
    /// A response was served from the cache.
    CacheHit,
    /// The transport call failed.
    Failed,
    /// A concurrent batch of two or more requests finished.
    MultiDone,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Requested => "Requested",
            EventKind::CacheHit => "CacheHit",
            EventKind::Failed => "Failed",
            EventKind::MultiDone => "MultiDone",
        }
    }
}

/// One timing observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub duration: Duration,
    /// The request URL, or the joined URLs for `MultiDone`.
    pub subject: String,
}

impl Event {
    pub fn new(kind: EventKind, duration: Duration, subject: impl Into<String>) -> Self {
        Self {
            kind,
            duration,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rest-core: spent {:.6} {} {}",
            self.duration.as_secs_f64(),
            self.kind.as_str(),
            self.subject
        )
    }
}

/// Receives events. Must not block for long.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Forwards events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, event: &Event) {
        debug!(
            kind = event.kind.as_str(),
            duration_ms = event.duration.as_secs_f64() * 1000.0,
            subject = %event.subject,
            "rest-core event"
        );
    }
}

/// Structured callback sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn notify(&self, event: &Event) {
        (self.0)(event)
    }
}

/// Plain-text sink: receives one `DEBUG: ...` line per event.
pub struct LineSink<F>(pub F);

impl<F> EventSink for LineSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, event: &Event) {
        (self.0)(&format!("DEBUG: {event}"))
    }
}

/// The set of sinks a client reports to. Cheap to clone.
#[derive(Clone, Default)]
pub struct Events {
    sinks: Arc<Vec<Arc<dyn EventSink>>>,
}

impl Events {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn emit(&self, event: Event) {
        for sink in self.sinks.iter() {
            if catch_unwind(AssertUnwindSafe(|| sink.notify(&event))).is_err() {
                warn!(kind = event.kind.as_str(), subject = %event.subject, "event sink panicked");
            }
        }
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
