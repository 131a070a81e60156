//! Per-call options.
//!
//! `RequestOptions` is what a caller passes: every field is an optional
//! override. `DispatchOptions` is what the dispatcher reads: every field is
//! resolved against the client's `ClientConfig` before dispatch starts and is
//! not modified afterwards.

use std::time::Duration;

use crate::config::DEFAULT_TIMEOUT;
use crate::http::HttpRequest;

/// Fully resolved options for one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Decode bodies with the client's codec. When false the raw body is
    /// returned and no error classification happens.
    pub auto_decode: bool,
    /// Budget for the whole dispatch call.
    pub timeout: Duration,
    /// When false, cached entries for the batch are invalidated up front and
    /// nothing is read from or written to the cache.
    pub use_cache: bool,
    /// Expiry for entries written by this call, if the backend supports it.
    pub expires_in: Option<Duration>,
    /// Run through the concurrent path even for a single request.
    pub async_mode: bool,
    /// Headers added on top of the client's headers.
    pub extra_headers: Vec<(String, String)>,
    /// Fingerprint this URI instead of the request URL.
    pub cache_uri: Option<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            auto_decode: true,
            timeout: DEFAULT_TIMEOUT,
            use_cache: true,
            expires_in: None,
            async_mode: false,
            extra_headers: Vec::new(),
            cache_uri: None,
        }
    }
}

impl DispatchOptions {
    /// The URI a request's cache entry is keyed by.
    pub fn key_uri<'a>(&'a self, request: &'a HttpRequest) -> &'a str {
        self.cache_uri.as_deref().unwrap_or(&request.url)
    }
}

/// Per-call overrides. Unset fields fall back to the client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub auto_decode: Option<bool>,
    pub timeout: Option<Duration>,
    pub use_cache: Option<bool>,
    pub expires_in: Option<Duration>,
    pub async_mode: Option<bool>,
    pub headers: Vec<(String, String)>,
    pub cache_uri: Option<String>,
    /// Treat a non-GET request as cacheable.
    pub cache_eligible: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_decode(mut self, enabled: bool) -> Self {
        self.auto_decode = Some(enabled);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = Some(enabled);
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    pub fn async_mode(mut self, enabled: bool) -> Self {
        self.async_mode = Some(enabled);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cache_uri(mut self, uri: impl Into<String>) -> Self {
        self.cache_uri = Some(uri.into());
        self
    }

    pub fn cache_eligible(mut self) -> Self {
        self.cache_eligible = true;
        self
    }

    /// Copy of these options with `async_mode` forced on unless the caller
    /// set it explicitly.
    pub(crate) fn with_async_default(&self) -> Self {
        let mut options = self.clone();
        options.async_mode.get_or_insert(true);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_client_defaults() {
        let options = DispatchOptions::default();
        assert!(options.auto_decode);
        assert!(options.use_cache);
        assert!(!options.async_mode);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.expires_in, None);
    }

    #[test]
    fn key_uri_prefers_override() {
        let request = HttpRequest::get("http://a/me?access_token=t");
        let plain = DispatchOptions::default();
        assert_eq!(plain.key_uri(&request), "http://a/me?access_token=t");
        let keyed = DispatchOptions {
            cache_uri: Some("http://a/me".into()),
            ..DispatchOptions::default()
        };
        assert_eq!(keyed.key_uri(&request), "http://a/me");
    }

    #[test]
    fn async_default_does_not_override_explicit_choice() {
        assert_eq!(RequestOptions::new().with_async_default().async_mode, Some(true));
        assert_eq!(
            RequestOptions::new()
                .async_mode(false)
                .with_async_default()
                .async_mode,
            Some(false)
        );
    }
}
