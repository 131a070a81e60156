//! Client facade: configuration, URL and header assembly, verb helpers.
//!
//! # Design
//! `RestClient` holds the resolved `ClientConfig` and a `Dispatcher`. Each
//! verb is split the way a wrapped API uses it: `build_request` produces an
//! `HttpRequest` from a path, query and payload, and the verb helpers hand
//! it to the dispatcher. `get`/`post`/`put`/`delete` block the caller;
//! the `a`-prefixed variants and `multi` run on the caller's tokio runtime.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::CacheBackend;
use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatched, Dispatcher, DispatcherBuilder, ErrorHandler, SlotResult};
use crate::error::Error;
use crate::event::{Event, EventSink, FnSink, LineSink};
use crate::hooks::RequestHooks;
use crate::http::{HttpMethod, HttpRequest};
use crate::options::{DispatchOptions, RequestOptions};
use crate::transport::Transport;
use crate::uri::{build_headers, build_url};

/// One entry of a `multi` batch, with a path relative to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub payload: Option<Value>,
}

impl BatchRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            payload: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn post(path: impl Into<String>, payload: Value) -> Self {
        Self::new(HttpMethod::Post, path).payload(payload)
    }

    pub fn put(path: impl Into<String>, payload: Value) -> Self {
        Self::new(HttpMethod::Put, path).payload(payload)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Builder for `RestClient`.
pub struct ClientBuilder<T> {
    config: ClientConfig,
    dispatcher: DispatcherBuilder<T>,
}

impl<T: Transport> ClientBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            config: ClientConfig::default(),
            dispatcher: DispatcherBuilder::new(transport),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.dispatcher = self.dispatcher.codec(codec);
        self
    }

    /// Enable caching. Without a backend every cache operation is a no-op.
    pub fn cache(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.dispatcher = self.dispatcher.cache(backend);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.dispatcher = self.dispatcher.event_sink(sink);
        self
    }

    /// Structured event callback.
    pub fn log_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.event_sink(Arc::new(FnSink(handler)))
    }

    /// Plain-text log line callback.
    pub fn log_method<F>(self, method: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_sink(Arc::new(LineSink(method)))
    }

    pub fn hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.dispatcher = self.dispatcher.hooks(hooks);
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error, &str) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        self.dispatcher = self.dispatcher.error_handler(handler);
        self
    }

    pub fn build(self) -> Result<RestClient<T>, Error> {
        self.config.validate()?;
        Ok(RestClient {
            config: self.config,
            dispatcher: self.dispatcher.build(),
        })
    }
}

/// HTTP API client built on the dispatcher.
#[derive(Debug)]
pub struct RestClient<T> {
    config: ClientConfig,
    dispatcher: Dispatcher<T>,
}

impl<T: Transport> RestClient<T> {
    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Resolve per-call overrides against the client defaults.
    pub fn options(&self, overrides: &RequestOptions) -> DispatchOptions {
        self.config.resolve(overrides)
    }

    /// `server + path + ?query`. Configured default query first, then hook
    /// parameters, then the call's own; later keys win.
    pub fn url(&self, path: &str, query: &[(String, String)], options: &RequestOptions) -> String {
        let mut pairs: Vec<(String, Option<String>)> = self
            .config
            .default_query
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        pairs.extend(self.dispatcher.hooks().prepare_query(options));
        pairs.extend(query.iter().map(|(k, v)| (k.clone(), Some(v.clone()))));
        build_url(&self.config.server, path, &pairs)
    }

    pub fn headers(&self, options: &RequestOptions) -> Vec<(String, String)> {
        build_headers(
            self.config.accept.as_deref(),
            self.config.lang.as_deref(),
            self.dispatcher.hooks().prepare_headers(options),
            &options.headers,
        )
    }

    /// Build the request descriptor for one call.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        payload: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<HttpRequest, Error> {
        let mut headers = self.headers(options);
        let body = match payload {
            Some(value) => {
                let body = self.dispatcher.codec().encode(value).map_err(Error::Encode)?;
                if !headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(body)
            }
            None => None,
        };
        Ok(HttpRequest {
            method,
            url: self.url(path, query, options),
            headers,
            body,
            cache_eligible: options.cache_eligible,
        })
    }

    /// Dispatch prepared requests, blocking the caller.
    pub fn request(
        &self,
        options: &RequestOptions,
        requests: Vec<HttpRequest>,
    ) -> Result<Dispatched, Error> {
        self.dispatcher.dispatch(requests, &self.options(options))
    }

    /// Dispatch prepared requests on the caller's runtime.
    pub async fn request_async(
        &self,
        options: &RequestOptions,
        requests: Vec<HttpRequest>,
    ) -> Result<Dispatched, Error> {
        self.dispatcher
            .dispatch_async(requests, &self.options(options))
            .await
    }

    fn call(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        payload: Option<&Value>,
        options: &RequestOptions,
    ) -> SlotResult {
        let request = self.build_request(method, path, query, payload, options)?;
        self.request(options, vec![request])?.into_single()
    }

    async fn acall(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        payload: Option<&Value>,
        options: &RequestOptions,
    ) -> SlotResult {
        let request = self.build_request(method, path, query, payload, options)?;
        self.request_async(options, vec![request])
            .await?
            .into_single()
    }

    pub fn get(&self, path: &str, query: &[(String, String)], options: &RequestOptions) -> SlotResult {
        self.call(HttpMethod::Get, path, query, None, options)
    }

    pub fn delete(&self, path: &str, query: &[(String, String)], options: &RequestOptions) -> SlotResult {
        self.call(HttpMethod::Delete, path, query, None, options)
    }

    pub fn post(
        &self,
        path: &str,
        payload: &Value,
        query: &[(String, String)],
        options: &RequestOptions,
    ) -> SlotResult {
        self.call(HttpMethod::Post, path, query, Some(payload), options)
    }

    pub fn put(
        &self,
        path: &str,
        payload: &Value,
        query: &[(String, String)],
        options: &RequestOptions,
    ) -> SlotResult {
        self.call(HttpMethod::Put, path, query, Some(payload), options)
    }

    pub async fn aget(
        &self,
        path: &str,
        query: &[(String, String)],
        options: &RequestOptions,
    ) -> SlotResult {
        self.acall(HttpMethod::Get, path, query, None, options).await
    }

    pub async fn adelete(
        &self,
        path: &str,
        query: &[(String, String)],
        options: &RequestOptions,
    ) -> SlotResult {
        self.acall(HttpMethod::Delete, path, query, None, options).await
    }

    pub async fn apost(
        &self,
        path: &str,
        payload: &Value,
        query: &[(String, String)],
        options: &RequestOptions,
    ) -> SlotResult {
        self.acall(HttpMethod::Post, path, query, Some(payload), options)
            .await
    }

    pub async fn aput(
        &self,
        path: &str,
        payload: &Value,
        query: &[(String, String)],
        options: &RequestOptions,
    ) -> SlotResult {
        self.acall(HttpMethod::Put, path, query, Some(payload), options)
            .await
    }

    fn build_batch(
        &self,
        batch: &[BatchRequest],
        options: &RequestOptions,
    ) -> Result<Vec<HttpRequest>, Error> {
        batch
            .iter()
            .map(|entry| {
                self.build_request(
                    entry.method,
                    &entry.path,
                    &entry.query,
                    entry.payload.as_ref(),
                    options,
                )
            })
            .collect()
    }

    /// Run a batch concurrently on the caller's runtime. Results are in
    /// batch order.
    pub async fn multi(
        &self,
        batch: &[BatchRequest],
        options: &RequestOptions,
    ) -> Result<Vec<SlotResult>, Error> {
        let requests = self.build_batch(batch, options)?;
        Ok(self.request_async(options, requests).await?.into_results())
    }

    /// Blocking variant of `multi`.
    pub fn multi_blocking(
        &self,
        batch: &[BatchRequest],
        options: &RequestOptions,
    ) -> Result<Vec<SlotResult>, Error> {
        let options = options.with_async_default();
        let requests = self.build_batch(batch, &options)?;
        Ok(self.request(&options, requests)?.into_results())
    }
}
