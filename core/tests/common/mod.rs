//! Deterministic transport and event recorder shared by the dispatcher tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rest_core::{
    Event, EventKind, EventSink, HttpRequest, HttpResponse, RequestHooks, Transport,
    TransportError,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Route dispatcher logs to the test output. Set `RUST_LOG=rest_core=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
struct Route {
    outcome: Result<HttpResponse, TransportError>,
    delay: Duration,
}

/// Transport answering from a table of canned responses keyed by URL.
///
/// Unknown URLs answer 404. Every call is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, url: &str, body: &str) -> Self {
        self.ok_after(url, body, Duration::ZERO)
    }

    pub fn ok_after(self, url: &str, body: &str, delay: Duration) -> Self {
        self.route(url, Ok(HttpResponse::ok(body)), delay)
    }

    pub fn fail(self, url: &str, error: TransportError) -> Self {
        self.route(url, Err(error), Duration::ZERO)
    }

    fn route(self, url: &str, outcome: Result<HttpResponse, TransportError>, delay: Duration) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route { outcome, delay });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    /// Every request that reached the transport, as sent.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| *u == url).count()
    }

    fn lookup(&self, request: &HttpRequest) -> Route {
        self.calls.lock().unwrap().push(request.clone());
        self.routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or(Route {
                outcome: Err(TransportError::status(404, "")),
                delay: Duration::ZERO,
            })
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let route = self.lookup(request);
        if route.delay > timeout {
            std::thread::sleep(timeout);
            return Err(TransportError::timed_out("mock transport timed out"));
        }
        std::thread::sleep(route.delay);
        route.outcome
    }

    async fn execute_async(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let route = self.lookup(&request);
        if route.delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::timed_out("mock transport timed out"));
        }
        tokio::time::sleep(route.delay).await;
        route.outcome
    }
}

/// Event sink that keeps everything it sees.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::new(self.clone())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for Recorder {
    fn notify(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Flags `{"error": ...}` envelopes and counts how often it was asked.
#[derive(Default)]
pub struct CountingHooks {
    pub checks: AtomicUsize,
}

impl CountingHooks {
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl RequestHooks for CountingHooks {
    fn is_error(&self, decoded: &Value) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        decoded.get("error").is_some()
    }
}

/// Error handler calls captured as `(error text, uri)`.
#[derive(Clone, Default)]
pub struct HandlerLog {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl HandlerLog {
    pub fn handler(&self) -> rest_core::ErrorHandler {
        let calls = Arc::clone(&self.calls);
        Arc::new(move |error: &rest_core::Error, uri: &str| {
            calls.lock().unwrap().push((error.to_string(), uri.to_string()));
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}
