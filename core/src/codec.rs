//! Pluggable body codecs.
//!
//! Codecs are picked once, when a client is built, from an ordered list of
//! candidates: the first one reporting itself available wins.

use std::sync::Arc;

use serde_json::Value;

use crate::error::CodecError;

/// Encodes request payloads and decodes response bodies.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this codec can be used in the current build.
    fn is_available(&self) -> bool {
        true
    }

    fn encode(&self, value: &Value) -> Result<String, CodecError>;

    fn decode(&self, body: &str) -> Result<Value, CodecError>;
}

/// Full JSON codec backed by serde_json.
///
/// Scalars are accepted at the top level, so `"42"` decodes to a number and
/// `"true"` to a boolean. An empty or whitespace-only body (a 204 reply, for
/// instance) decodes to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Unsupported(e.to_string()))
    }

    fn decode(&self, body: &str) -> Result<Value, CodecError> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body).map_err(|e| CodecError::Parse(e.to_string()))
    }
}

/// Last-resort encoder for flat objects of string values.
///
/// It cannot decode; every `decode` call fails with
/// `CodecError::NotImplemented`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatCodec;

impl Codec for FlatCodec {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::Unsupported("flat codec only encodes objects".into()))?;
        let mut fields = Vec::with_capacity(object.len());
        for (key, value) in object {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(CodecError::Unsupported(format!(
                        "nested value under '{key}'"
                    )))
                }
            };
            fields.push(format!("\"{}\":\"{}\"", escape(key), escape(&text)));
        }
        Ok(format!("{{{}}}", fields.join(",")))
    }

    fn decode(&self, _body: &str) -> Result<Value, CodecError> {
        Err(CodecError::NotImplemented(self.name()))
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Pick the first available codec, in order.
///
/// Falls back to `FlatCodec` when no candidate is available.
pub fn select_codec(candidates: Vec<Arc<dyn Codec>>) -> Arc<dyn Codec> {
    candidates
        .into_iter()
        .find(|codec| codec.is_available())
        .unwrap_or_else(|| Arc::new(FlatCodec))
}

/// The default preference order: full JSON, then the flat encoder.
pub fn default_codec() -> Arc<dyn Codec> {
    select_codec(vec![Arc::new(JsonCodec), Arc::new(FlatCodec)])
}
