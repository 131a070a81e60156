//! Extension points a wrapped API plugs into.

use serde_json::Value;

use crate::options::RequestOptions;

/// Behavior specific to one wrapped API.
///
/// Every method has a neutral default, so an implementation only overrides
/// what its API needs.
pub trait RequestHooks: Send + Sync {
    /// Query parameters added to every URL. Per-call parameters win on
    /// conflicting keys.
    fn prepare_query(&self, _options: &RequestOptions) -> Vec<(String, Option<String>)> {
        Vec::new()
    }

    /// Headers added after `Accept`/`Accept-Language` and before per-call
    /// headers.
    fn prepare_headers(&self, _options: &RequestOptions) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether a successfully decoded body is an application error envelope.
    fn is_error(&self, _decoded: &Value) -> bool {
        false
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl RequestHooks for DefaultHooks {}

/// Treats any object carrying a top-level `key` as an error envelope,
/// e.g. `{"error": {"message": "..."}}`.
#[derive(Debug, Clone)]
pub struct ErrorKeyHooks {
    key: String,
}

impl ErrorKeyHooks {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl RequestHooks for ErrorKeyHooks {
    fn is_error(&self, decoded: &Value) -> bool {
        decoded
            .as_object()
            .is_some_and(|object| object.contains_key(&self.key))
    }
}
