//! Transport contract: performs one HTTP call.
//!
//! # Design
//! The dispatcher never talks to the network itself. A transport runs a
//! single `HttpRequest` either blocking on the caller's thread (`execute`)
//! or as a future (`execute_async`). Non-success statuses come back as a
//! `TransportError` carrying the response body, so structured error
//! payloads can still be decoded.

use std::time::Duration;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

#[cfg(feature = "ureq")]
pub use self::ureq_transport::UreqTransport;

/// Performs HTTP calls for the dispatcher.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport: Sync + 'static {
    /// Blocking call, bounded by `timeout`.
    ///
    /// # Errors
    /// Returns `TransportErrorKind::TimedOut` when the budget runs out,
    /// `Status` (with the body) for non-2xx answers.
    fn execute(&self, request: &HttpRequest, timeout: Duration)
        -> Result<HttpResponse, TransportError>;

    /// Non-blocking call. `timeout` is what is left of the dispatch budget
    /// when the call starts; the dispatcher also drops the future once the
    /// budget runs out.
    async fn execute_async(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "ureq")]
mod ureq_transport {
    use std::time::Duration;

    use tracing::warn;
    use ureq::Agent;

    use super::Transport;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};

    /// Transport backed by a ureq agent.
    ///
    /// Async calls run the blocking agent on tokio's blocking pool. Every
    /// call carries a ureq timeout no longer than the remaining dispatch
    /// budget, so a call abandoned by a timed-out batch frees its thread
    /// soon after.
    #[derive(Debug, Clone)]
    pub struct UreqTransport {
        agent: Agent,
        async_timeout: Option<Duration>,
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl UreqTransport {
        pub fn new() -> Self {
            let agent = Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .new_agent();
            Self {
                agent,
                async_timeout: None,
            }
        }

        /// Cap for async calls. Each call uses the smaller of this and the
        /// remaining dispatch budget.
        pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
            self.async_timeout = Some(timeout);
            self
        }

        fn call(
            agent: &Agent,
            request: &HttpRequest,
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            let result = match request.method {
                HttpMethod::Get | HttpMethod::Delete => {
                    let mut builder = if request.method == HttpMethod::Get {
                        agent.get(&request.url)
                    } else {
                        agent.delete(&request.url)
                    };
                    for (name, value) in &request.headers {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                    builder.config().timeout_global(Some(timeout)).build().call()
                }
                HttpMethod::Post | HttpMethod::Put => {
                    let mut builder = if request.method == HttpMethod::Post {
                        agent.post(&request.url)
                    } else {
                        agent.put(&request.url)
                    };
                    for (name, value) in &request.headers {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                    let builder = builder.config().timeout_global(Some(timeout)).build();
                    match &request.body {
                        Some(body) => builder.send(body.as_bytes()),
                        None => builder.send_empty(),
                    }
                }
            };

            let mut response = result.map_err(map_error)?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| TransportError::new(TransportErrorKind::Io, e.to_string()))?;

            if !(200..300).contains(&status) {
                return Err(TransportError::status(status, body));
            }
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }

    fn map_error(error: ureq::Error) -> TransportError {
        match error {
            ureq::Error::Timeout(_) => TransportError::timed_out(error.to_string()),
            ureq::Error::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut => {
                TransportError::timed_out(error.to_string())
            }
            ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
                TransportError::new(TransportErrorKind::Connect, error.to_string())
            }
            ureq::Error::Io(ref io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                TransportError::new(TransportErrorKind::Connect, error.to_string())
            }
            other => TransportError::new(TransportErrorKind::Io, other.to_string()),
        }
    }

    impl Transport for UreqTransport {
        fn execute(
            &self,
            request: &HttpRequest,
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            Self::call(&self.agent, request, timeout)
        }

        async fn execute_async(
            &self,
            request: HttpRequest,
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            let agent = self.agent.clone();
            let timeout = self.async_timeout.map_or(timeout, |cap| cap.min(timeout));
            tokio::task::spawn_blocking(move || Self::call(&agent, &request, timeout))
                .await
                .unwrap_or_else(|join_error| {
                    warn!(error = %join_error, "blocking transport task failed");
                    Err(TransportError::aborted(join_error.to_string()))
                })
        }
    }
}
