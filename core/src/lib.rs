//! Request-dispatch core for HTTP API client libraries.
//!
//! # Overview
//! A wrapped API describes its calls as `HttpRequest` values. The
//! `Dispatcher` decides, per request, whether the cache can answer. It sends
//! the rest through a pluggable `Transport`, either on the caller's thread or
//! concurrently, decodes bodies with a `Codec` and reports every outcome as
//! an `Event`.
//!
//! # Design
//! - Slot errors (transport, decode, application) never fail a batch; only
//!   the batch timeout does.
//! - Batch results come back in input order, not completion order.
//! - Only GET requests, or requests explicitly flagged cache-eligible, are
//!   cached. Entries are keyed by the SHA-256 of the request URI.
//! - `RestClient` adds configuration, URL/header assembly and the verb
//!   helpers on top of the dispatcher.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod hooks;
pub mod http;
pub mod options;
pub mod signing;
pub mod transport;
pub mod uri;

pub use cache::{cache_key, CacheAdapter, CacheBackend, MemoryCache};
pub use client::{BatchRequest, ClientBuilder, RestClient};
pub use codec::{default_codec, select_codec, Codec, FlatCodec, JsonCodec};
pub use config::ClientConfig;
pub use dispatcher::{Dispatched, Dispatcher, DispatcherBuilder, ErrorHandler, Payload, SlotResult};
pub use error::{CodecError, ConfigError, Error, TransportError, TransportErrorKind};
pub use event::{Event, EventKind, EventSink, Events, FnSink, LineSink, TracingSink};
pub use hooks::{DefaultHooks, ErrorKeyHooks, RequestHooks};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::{DispatchOptions, RequestOptions};
pub use signing::{hmac_sha256, hmac_sha256_hex};
pub use transport::{LocalTransport, Transport};

#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
