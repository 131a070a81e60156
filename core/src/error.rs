//! Error types for the dispatch layer.
//!
//! # Design
//! A single `Error` enum carries both kinds of failure a caller can see.
//! Slot errors (`Transport`, `Decode`, `Application`) describe one request
//! and never abort the rest of a batch. Batch errors (`Timeout`,
//! `EmptyBatch`, `NestedRuntime`, `Runtime`) fail the whole dispatch call
//! with no partial results.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by dispatch operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not complete the call.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The payload could not be parsed by the codec.
    #[error("decode error for {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: CodecError,
    },

    /// The payload parsed but describes a domain-level error.
    #[error("application error for {uri}: {value}")]
    Application {
        uri: String,
        value: serde_json::Value,
    },

    /// The whole dispatch exceeded its budget.
    #[error("dispatch timed out after {budget:?}")]
    Timeout { budget: Duration },

    /// `dispatch` was called without any request.
    #[error("dispatch called with an empty batch")]
    EmptyBatch,

    /// The blocking entry point was called from inside a tokio runtime.
    #[error("blocking dispatch called from within an async runtime; use dispatch_async")]
    NestedRuntime,

    /// The runtime for a blocking concurrent dispatch could not be built.
    #[error("failed to start dispatch runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// A request payload could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[source] CodecError),

    /// Client configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn decode(uri: impl Into<String>, source: CodecError) -> Self {
        Self::Decode {
            uri: uri.into(),
            source,
        }
    }

    pub fn application(uri: impl Into<String>, value: serde_json::Value) -> Self {
        Self::Application {
            uri: uri.into(),
            value,
        }
    }

    /// True for errors that fail a dispatch as a whole rather than one slot.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::EmptyBatch | Error::NestedRuntime | Error::Runtime(_)
        )
    }

    /// The decoded application error envelope, if this is one.
    pub fn application_value(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Application { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// What went wrong at the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established.
    Connect,
    /// The server answered with a non-success status.
    Status(u16),
    /// The transport gave up waiting.
    TimedOut,
    /// Reading or writing the body failed.
    Io,
    /// The call was abandoned before it produced a response.
    Aborted,
}

/// A transport failure, with whatever body the server sent back.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Body returned alongside an error status, kept so structured error
    /// payloads can still be decoded.
    pub body: Option<String>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            body: None,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Status(status),
            message: format!("HTTP {status}"),
            body: Some(body.into()),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::TimedOut, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Aborted, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::TimedOut
    }
}

/// Codec failures. Distinct from transport failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The payload is malformed for this codec.
    #[error("parse error: {0}")]
    Parse(String),

    /// The value cannot be represented by this codec.
    #[error("unsupported value: {0}")]
    Unsupported(String),

    /// The codec does not implement this direction.
    #[error("{0} does not support decoding; enable a JSON codec")]
    NotImplemented(&'static str),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config validation error at '{field}': {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
