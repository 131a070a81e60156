//! Request dispatcher: cache short-circuit, transport calls, decoding and
//! fan-out/fan-in.
//!
//! # Design
//! A single request in sync mode runs on the caller's thread. Everything
//! else goes through the concurrent path:
//!
//! 1. Cache hits resolve immediately and never reach the transport.
//! 2. Misses are spawned on a `JoinSet`, each task tagged with its input
//!    index. A task writes the cache and emits `Requested`/`Failed` as soon
//!    as its call completes.
//! 3. After every task has settled, slots are decoded in input order.
//!
//! The whole dispatch is bounded by `DispatchOptions::timeout`. Each
//! transport call gets what is left of it. When the budget runs out (or a
//! transport reports a timeout) the `JoinSet` is dropped, which aborts
//! in-flight tasks, and the call fails with `Error::Timeout` without partial
//! results. The blocking entry point shuts its runtime down without waiting
//! for abandoned blocking calls.

use std::fmt;
use std::slice;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheAdapter, CacheBackend};
use crate::codec::{default_codec, Codec};
use crate::error::{Error, TransportError};
use crate::event::{Event, EventKind, EventSink, Events};
use crate::hooks::{DefaultHooks, RequestHooks};
use crate::http::HttpRequest;
use crate::options::DispatchOptions;
use crate::transport::Transport;
use crate::uri::merge_headers;

/// Called with every decode or application error and the request URL.
pub type ErrorHandler = Arc<dyn Fn(&Error, &str) + Send + Sync>;

/// Outcome of one request.
pub type SlotResult = Result<Payload, Error>;

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body decoded by the client's codec.
    Decoded(Value),
    /// Body as received, when decoding is disabled.
    Raw(String),
}

impl Payload {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Decoded(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Payload::Decoded(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    /// Field lookup on a decoded object body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_value().and_then(|value| value.get(key))
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Payload::Raw(body) => Some(body),
            Payload::Decoded(_) => None,
        }
    }
}

/// Result of a dispatch: one slot for a single request, or one slot per
/// request in input order.
#[derive(Debug)]
pub enum Dispatched {
    Single(SlotResult),
    Multi(Vec<SlotResult>),
}

impl Dispatched {
    fn from_slots(mut slots: Vec<SlotResult>) -> Self {
        if slots.len() == 1 {
            if let Some(slot) = slots.pop() {
                return Dispatched::Single(slot);
            }
        }
        Dispatched::Multi(slots)
    }

    /// The only slot of a single dispatch, or the first slot of a batch.
    pub fn into_single(self) -> SlotResult {
        match self {
            Dispatched::Single(slot) => slot,
            Dispatched::Multi(slots) => slots.into_iter().next().unwrap_or(Err(Error::EmptyBatch)),
        }
    }

    pub fn into_results(self) -> Vec<SlotResult> {
        match self {
            Dispatched::Single(slot) => vec![slot],
            Dispatched::Multi(slots) => slots,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dispatched::Single(_) => 1,
            Dispatched::Multi(slots) => slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for creating a `Dispatcher`.
pub struct DispatcherBuilder<T> {
    transport: Arc<T>,
    codec: Arc<dyn Codec>,
    cache: Option<Arc<dyn CacheBackend>>,
    sinks: Vec<Arc<dyn EventSink>>,
    hooks: Arc<dyn RequestHooks>,
    error_handler: Option<ErrorHandler>,
}

impl<T: Transport> DispatcherBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    pub fn from_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            codec: default_codec(),
            cache: None,
            sinks: Vec::new(),
            hooks: Arc::new(DefaultHooks),
            error_handler: None,
        }
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn cache(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(backend);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn build(self) -> Dispatcher<T> {
        let events = Events::new(self.sinks);
        Dispatcher {
            transport: self.transport,
            codec: self.codec,
            cache: CacheAdapter::new(self.cache, events.clone()),
            events,
            hooks: self.hooks,
            error_handler: self.error_handler,
        }
    }
}

/// Runs logical requests against a transport, through the cache and codec.
pub struct Dispatcher<T> {
    transport: Arc<T>,
    codec: Arc<dyn Codec>,
    cache: CacheAdapter,
    events: Events,
    hooks: Arc<dyn RequestHooks>,
    error_handler: Option<ErrorHandler>,
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("codec", &self.codec.name())
            .field("cache", &self.cache.is_enabled())
            .field("events", &self.events)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn builder(transport: T) -> DispatcherBuilder<T> {
        DispatcherBuilder::new(transport)
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn cache(&self) -> &CacheAdapter {
        &self.cache
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn hooks(&self) -> &Arc<dyn RequestHooks> {
        &self.hooks
    }

    /// Blocking entry point.
    ///
    /// A single request with `async_mode` off runs on the calling thread.
    /// Otherwise the concurrent path runs on a runtime owned by this call;
    /// callers already inside a tokio runtime must use `dispatch_async`.
    #[instrument(
        name = "dispatch",
        skip(self, requests, options),
        fields(count = requests.len(), async_mode = options.async_mode)
    )]
    pub fn dispatch(
        &self,
        mut requests: Vec<HttpRequest>,
        options: &DispatchOptions,
    ) -> Result<Dispatched, Error> {
        if requests.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if !options.async_mode && requests.len() == 1 {
            if let Some(request) = requests.pop() {
                return self.dispatch_sync(request, options).map(Dispatched::Single);
            }
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::NestedRuntime);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        let dispatched = runtime.block_on(self.dispatch_async(requests, options));
        // Dropping the runtime would wait for abandoned blocking calls.
        runtime.shutdown_background();
        dispatched
    }

    /// Concurrent path for callers inside a tokio runtime. Always fans out,
    /// whatever `async_mode` says.
    #[instrument(
        name = "dispatch_async",
        skip(self, requests, options),
        fields(count = requests.len())
    )]
    pub async fn dispatch_async(
        &self,
        requests: Vec<HttpRequest>,
        options: &DispatchOptions,
    ) -> Result<Dispatched, Error> {
        if requests.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let budget = options.timeout;
        match tokio::time::timeout(budget, self.fan_out(requests, options)).await {
            Ok(slots) => slots.map(Dispatched::from_slots),
            Err(_) => {
                warn!(?budget, "dispatch timed out, abandoning in-flight requests");
                Err(Error::Timeout { budget })
            }
        }
    }

    /// One request on the calling thread. The outer `Result` is the batch
    /// outcome (timeout), the inner one the request outcome.
    fn dispatch_sync(
        &self,
        request: HttpRequest,
        options: &DispatchOptions,
    ) -> Result<SlotResult, Error> {
        let start = Instant::now();
        let budget = options.timeout;
        let request = with_extra_headers(request, options);
        self.invalidate_uncached(slice::from_ref(&request), options);

        if let Some(body) = self.cache.lookup(&request, options) {
            return Ok(self.decode(body, &request, options));
        }

        let remaining = budget.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(Error::Timeout { budget });
        }
        debug!(method = %request.method, url = %request.url, "sending request");
        let outcome = self.transport.execute(&request, remaining);
        if start.elapsed() > budget || outcome.as_ref().is_err_and(TransportError::is_timeout) {
            warn!(url = %request.url, ?budget, "request timed out");
            return Err(Error::Timeout { budget });
        }

        match outcome {
            Ok(response) => {
                self.cache.cache_for(&request, options, &response.body);
                self.events.emit(Event::new(
                    EventKind::Requested,
                    start.elapsed(),
                    request.url.as_str(),
                ));
                Ok(self.decode(response.body, &request, options))
            }
            Err(error) => {
                warn!(url = %request.url, error = %error, "request failed");
                self.events
                    .emit(Event::new(EventKind::Failed, start.elapsed(), request.url.as_str()));
                Ok(self.classify_failure(error, &request, options))
            }
        }
    }

    async fn fan_out(
        &self,
        requests: Vec<HttpRequest>,
        options: &DispatchOptions,
    ) -> Result<Vec<SlotResult>, Error> {
        let start = Instant::now();
        let requests: Vec<HttpRequest> = requests
            .into_iter()
            .map(|request| with_extra_headers(request, options))
            .collect();
        self.invalidate_uncached(&requests, options);

        let mut raw: Vec<Option<Result<String, TransportError>>> =
            (0..requests.len()).map(|_| None).collect();
        let mut sent = Vec::new();
        let mut tasks = JoinSet::new();
        let shared_options = Arc::new(options.clone());

        for (index, request) in requests.iter().enumerate() {
            if let Some(body) = self.cache.lookup(request, options) {
                raw[index] = Some(Ok(body));
                continue;
            }
            sent.push(request.url.clone());

            let transport = Arc::clone(&self.transport);
            let cache = self.cache.clone();
            let events = self.events.clone();
            let options = Arc::clone(&shared_options);
            let request = request.clone();
            let remaining = options.timeout.saturating_sub(start.elapsed());
            tasks.spawn(async move {
                debug!(method = %request.method, url = %request.url, "sending request");
                let outcome = transport.execute_async(request.clone(), remaining).await;
                match &outcome {
                    Ok(response) => {
                        cache.cache_for(&request, &options, &response.body);
                        events.emit(Event::new(
                            EventKind::Requested,
                            start.elapsed(),
                            request.url.as_str(),
                        ));
                    }
                    Err(error) => {
                        warn!(url = %request.url, error = %error, "request failed");
                        events.emit(Event::new(
                            EventKind::Failed,
                            start.elapsed(),
                            request.url.as_str(),
                        ));
                    }
                }
                (index, outcome.map(|response| response.body))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => raw[index] = Some(outcome),
                Err(join_error) => warn!(error = %join_error, "transport task did not complete"),
            }
        }

        let transport_timed_out = raw
            .iter()
            .flatten()
            .any(|slot| slot.as_ref().is_err_and(TransportError::is_timeout));
        if transport_timed_out {
            let budget = options.timeout;
            warn!(?budget, "request ran out of dispatch budget");
            return Err(Error::Timeout { budget });
        }

        if requests.len() > 1 {
            self.events.emit(Event::new(
                EventKind::MultiDone,
                start.elapsed(),
                sent.join(", "),
            ));
        }

        Ok(requests
            .iter()
            .zip(raw)
            .map(|(request, slot)| match slot {
                Some(Ok(body)) => self.decode(body, request, options),
                Some(Err(error)) => self.classify_failure(error, request, options),
                None => Err(Error::Transport(TransportError::aborted(
                    "transport task panicked",
                ))),
            })
            .collect())
    }

    /// With caching turned off for this call, drop the entries the batch
    /// would otherwise have read so they are refreshed later.
    fn invalidate_uncached(&self, requests: &[HttpRequest], options: &DispatchOptions) {
        if options.use_cache || !self.cache.is_enabled() {
            return;
        }
        for request in requests.iter().filter(|r| r.is_cacheable()) {
            debug!(url = %request.url, "invalidating cache entry");
            self.cache.invalidate(options.key_uri(request));
        }
    }

    /// Decode a body and classify it.
    pub fn decode(&self, body: String, request: &HttpRequest, options: &DispatchOptions) -> SlotResult {
        if !options.auto_decode {
            return Ok(Payload::Raw(body));
        }
        let uri = request.url.as_str();
        match self.codec.decode(&body) {
            Err(source) => {
                let error = Error::decode(uri, source);
                self.report(&error, uri);
                Err(error)
            }
            Ok(value) if self.hooks.is_error(&value) => Err(self.application_error(value, request, options)),
            Ok(value) => Ok(Payload::Decoded(value)),
        }
    }

    /// A failed call may still carry an application error envelope in its
    /// body. Anything else stays a transport error; a body the codec cannot
    /// read is reported to the error handler first.
    fn classify_failure(
        &self,
        error: TransportError,
        request: &HttpRequest,
        options: &DispatchOptions,
    ) -> SlotResult {
        if !options.auto_decode {
            return Err(Error::Transport(error));
        }
        if let Some(body) = error.body.as_deref() {
            match self.codec.decode(body) {
                Ok(value) if self.hooks.is_error(&value) => {
                    return Err(self.application_error(value, request, options));
                }
                Ok(_) => {}
                Err(source) => {
                    let uri = request.url.as_str();
                    self.report(&Error::decode(uri, source), uri);
                }
            }
        }
        Err(Error::Transport(error))
    }

    fn application_error(&self, value: Value, request: &HttpRequest, options: &DispatchOptions) -> Error {
        let uri = request.url.as_str();
        self.cache.invalidate(options.key_uri(request));
        let error = Error::application(uri, value);
        self.report(&error, uri);
        error
    }

    fn report(&self, error: &Error, uri: &str) {
        debug!(uri, error = %error, "reporting error");
        if let Some(handler) = &self.error_handler {
            handler(error, uri);
        }
    }
}

/// Per-call headers from the options, applied over the request's own.
fn with_extra_headers(mut request: HttpRequest, options: &DispatchOptions) -> HttpRequest {
    if !options.extra_headers.is_empty() {
        merge_headers(&mut request.headers, options.extra_headers.iter().cloned());
    }
    request
}
