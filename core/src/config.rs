//! Client-level configuration.
//!
//! # Design
//! `ClientConfig` holds the defaults every request inherits. It is resolved
//! once when a client is built and then only read. Per-call overrides go
//! through `RequestOptions`; `ClientConfig::resolve` merges the two into the
//! `DispatchOptions` the dispatcher sees.
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! server = "https://graph.example.com/"
//! accept = "application/json"
//! lang = "en-us"
//! auto_decode = true
//! timeout_secs = 10
//!
//! [default_query]
//! locale = "en_US"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::options::{DispatchOptions, RequestOptions};

pub const DEFAULT_SERVER: &str = "http://localhost/";
pub const DEFAULT_ACCEPT: &str = "text/javascript";
pub const DEFAULT_LANG: &str = "en-us";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Defaults shared by every request a client makes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Prefix for relative paths. Default `http://localhost/`.
    pub server: String,
    /// `Accept` header. `None` omits it. Default `text/javascript`.
    pub accept: Option<String>,
    /// `Accept-Language` header. `None` omits it. Default `en-us`.
    pub lang: Option<String>,
    /// Decode responses with the codec. Default `true`.
    pub auto_decode: bool,
    /// Budget for one dispatch call. Default 10 seconds.
    #[serde(rename = "timeout_secs", deserialize_with = "duration_from_secs")]
    pub timeout: Duration,
    /// Query parameters added to every request URL before any others.
    pub default_query: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            accept: Some(DEFAULT_ACCEPT.to_string()),
            lang: Some(DEFAULT_LANG.to_string()),
            auto_decode: true,
            timeout: DEFAULT_TIMEOUT,
            default_query: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::validation("server", "must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::validation("timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Merge per-call overrides into the options for one dispatch.
    pub fn resolve(&self, overrides: &RequestOptions) -> DispatchOptions {
        DispatchOptions {
            auto_decode: overrides.auto_decode.unwrap_or(self.auto_decode),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            use_cache: overrides.use_cache.unwrap_or(true),
            expires_in: overrides.expires_in,
            async_mode: overrides.async_mode.unwrap_or(false),
            extra_headers: overrides.headers.clone(),
            cache_uri: overrides.cache_uri.clone(),
        }
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server, "http://localhost/");
        assert_eq!(config.accept.as_deref(), Some("text/javascript"));
        assert_eq!(config.lang.as_deref(), Some("en-us"));
        assert!(config.auto_decode);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.default_query.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_with_partial_fields_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            server = "https://graph.example.com/"
            timeout_secs = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server, "https://graph.example.com/");
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.lang.as_deref(), Some("en-us"));
        assert!(config.auto_decode);
    }

    #[test]
    fn toml_rejects_unknown_fields_and_bad_values() {
        assert!(matches!(
            ClientConfig::from_toml_str("srever = \"x\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("timeout_secs = 0"),
            Err(ConfigError::Validation { .. })
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("server = \"  \""),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn resolve_applies_overrides() {
        let config = ClientConfig::default();
        let resolved = config.resolve(
            &RequestOptions::new()
                .auto_decode(false)
                .timeout(Duration::from_secs(1))
                .use_cache(false)
                .header("X-Debug", "1"),
        );
        assert!(!resolved.auto_decode);
        assert!(!resolved.use_cache);
        assert_eq!(resolved.timeout, Duration::from_secs(1));
        assert_eq!(resolved.extra_headers, vec![("X-Debug".into(), "1".into())]);

        let inherited = config.resolve(&RequestOptions::new());
        assert_eq!(inherited, DispatchOptions::default());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            "accept = \"application/json\"\nauto_decode = false\n\n[default_query]\nlocale = \"en_US\"\n",
        )
        .unwrap();
        let config = ClientConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.accept.as_deref(), Some("application/json"));
        assert!(!config.auto_decode);
        assert_eq!(config.default_query.get("locale").map(String::as_str), Some("en_US"));
    }
}
