//! Wire envelope codec for the funcell worker protocol.
//!
//! Every message exchanged with a worker is one JSON object per line:
//!
//! ```text
//! {"type": <string>, "data": <any>}
//! ```
//!
//! The `type` tag is drawn from a closed set (see [`kind`]); `data` is a
//! tag-dependent payload. This crate only validates the envelope shape -
//! what `data` must look like for a given tag is each consumer's business.
//!
//! # Example
//!
//! ```rust
//! use funcell_envelope::{kind, Envelope};
//!
//! let envelope = Envelope::decode(r#"{"type":"request","data":{"x":1}}"#).unwrap();
//! assert_eq!(envelope.kind, kind::REQUEST);
//! assert_eq!(envelope.data["x"], 1);
//!
//! let line = Envelope::started().encode().unwrap();
//! assert_eq!(line, r#"{"type":"started","data":""}"#);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The closed set of message tags understood by the protocol.
pub mod kind {
    /// Outbound. The worker is alive and awaiting a module.
    pub const STARTED: &str = "started";
    /// Inbound. `data` is the base64 text of a module artifact.
    pub const FUNCTION: &str = "function";
    /// Outbound. The module was materialized; `data` is `true`.
    pub const FUNCTION_LOADED: &str = "function_loaded";
    /// Inbound. `data` is the argument for one invocation.
    pub const REQUEST: &str = "request";
    /// Outbound. `data` is the result of one invocation.
    pub const RESPONSE: &str = "response";
    /// Outbound. `data` carries the failed request and a message.
    pub const ERROR: &str = "error";
}

/// Errors from envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The line is not a well-formed envelope: not valid JSON, or the
    /// `type` field is missing or not a string.
    #[error("invalid envelope: {0}")]
    Decode(serde_json::Error),

    /// The envelope could not be serialized.
    #[error("envelope serialization failed: {0}")]
    Encode(serde_json::Error),
}

/// One protocol message: a `type` tag and a tag-dependent payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The message tag. See [`kind`] for the closed set.
    #[serde(rename = "type")]
    pub kind: String,

    /// The payload. Absent on the wire decodes as JSON null.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope with an arbitrary tag and payload.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// The liveness message emitted before any input is read.
    pub fn started() -> Self {
        Self::new(kind::STARTED, Value::String(String::new()))
    }

    /// Acknowledges a successful module load.
    pub fn function_loaded() -> Self {
        Self::new(kind::FUNCTION_LOADED, Value::Bool(true))
    }

    /// Wraps one invocation result.
    pub fn response(result: Value) -> Self {
        Self::new(kind::RESPONSE, result)
    }

    /// Wraps one invocation failure, carrying the request that caused it.
    pub fn error(request: Value, message: impl Into<String>) -> Self {
        Self::new(
            kind::ERROR,
            serde_json::json!({
                "request": request,
                "message": message.into(),
            }),
        )
    }

    /// Decode one line into an envelope.
    ///
    /// Fails if the line is not a JSON object or lacks a string `type`
    /// field. No validation of `data` is performed.
    pub fn decode(line: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(line).map_err(EnvelopeError::Decode)
    }

    /// Encode this envelope as a single line of JSON (no trailing newline).
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }
}
