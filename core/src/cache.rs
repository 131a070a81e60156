//! Response cache keyed by a request fingerprint.
//!
//! # Design
//! `CacheBackend` is the storage contract: a concurrent key-value map with
//! optional TTL support, advertised through `supports_ttl`. `CacheAdapter`
//! sits between the dispatcher and the backend. It owns the fingerprinting,
//! the eligibility rule (only GET or explicitly flagged requests) and the
//! `CacheHit` event. A client without a backend gets an adapter whose
//! operations all do nothing.
//!
//! Entries hold the raw response body, before decoding.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::event::{Event, EventKind, Events};
use crate::http::HttpRequest;
use crate::options::DispatchOptions;

/// Storage contract for cached response bodies.
///
/// Each operation must be atomic for its key. No cross-key guarantees are
/// required.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value`. `ttl` is only passed when `supports_ttl` is true.
    fn set(&self, key: &str, value: String, ttl: Option<Duration>);

    fn remove(&self, key: &str);

    fn supports_ttl(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache backend with per-entry expiry.
///
/// Expired entries are dropped lazily, on the next read of their key.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn supports_ttl(&self) -> bool {
        true
    }
}

/// Deterministic fingerprint of a URI: lowercase hex SHA-256.
pub fn cache_key(uri: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Dispatcher-facing view of the cache.
#[derive(Clone, Default)]
pub struct CacheAdapter {
    backend: Option<Arc<dyn CacheBackend>>,
    events: Events,
}

impl CacheAdapter {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, events: Events) -> Self {
        Self { backend, events }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Look up `key_uri`. A present value emits `CacheHit` for `uri`.
    pub fn get(&self, uri: &str, key_uri: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        let start = Instant::now();
        let value = backend.get(&cache_key(key_uri));
        if value.is_some() {
            self.events
                .emit(Event::new(EventKind::CacheHit, start.elapsed(), uri));
        }
        value
    }

    /// Store `value` under `key_uri`, with expiry only if the backend
    /// honors it.
    pub fn put(&self, key_uri: &str, value: String, ttl: Option<Duration>) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let ttl = if backend.supports_ttl() { ttl } else { None };
        backend.set(&cache_key(key_uri), value, ttl);
    }

    pub fn invalidate(&self, key_uri: &str) {
        if let Some(backend) = self.backend.as_ref() {
            backend.remove(&cache_key(key_uri));
        }
    }

    /// Read path for one request: only cacheable requests with caching
    /// enabled are looked up.
    pub fn lookup(&self, request: &HttpRequest, options: &DispatchOptions) -> Option<String> {
        if !options.use_cache || !request.is_cacheable() {
            return None;
        }
        self.get(&request.url, options.key_uri(request))
    }

    /// Write path for one successful response.
    pub fn cache_for(&self, request: &HttpRequest, options: &DispatchOptions, body: &str) {
        if !options.use_cache || !request.is_cacheable() || !self.is_enabled() {
            return;
        }
        debug!(url = %request.url, ttl = ?options.expires_in, "caching response");
        self.put(options.key_uri(request), body.to_string(), options.expires_in);
    }
}
