//! Upstream page envelopes.
//!
//! Every page of the upstream API is wrapped as
//! `{"status": "ok", "message": {"items": [...]}}`. Other members of the
//! envelope and of `message` (totals, cursors, facets) are preserved so an
//! envelope can be re-serialized without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Status value of a healthy envelope.
pub const STATUS_OK: &str = "ok";

/// One parsed API page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Upstream status flag; anything but [`STATUS_OK`] is a protocol violation.
    pub status: String,
    /// Payload wrapper.
    pub message: EnvelopeMessage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `message` member of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    /// Opaque record payloads, in upstream order.
    pub items: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Returns true if the upstream reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// The page's items.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.message.items
    }

    /// Serializes the envelope as one compact JSON line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns the serializer error; this only happens for non-string map
    /// keys, which a parsed envelope never has.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a body could not be accepted as an [`Envelope`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The bytes are not the expected JSON shape.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// Parser diagnostic.
        reason: String,
    },

    /// The envelope parsed but its status is not `ok`.
    #[error("envelope status is {status:?}")]
    Status {
        /// The status the upstream reported.
        status: String,
    },
}

impl EnvelopeError {
    fn malformed(reason: impl ToString) -> Self {
        Self::Malformed {
            reason: reason.to_string(),
        }
    }
}

/// Parses a response body into an [`Envelope`].
///
/// The status is checked before the shape of `message`, so an error envelope
/// such as `{"status": "failed", "message": [...]}` is reported as
/// [`EnvelopeError::Status`] rather than as garbled bytes.
///
/// # Errors
///
/// [`EnvelopeError::Malformed`] for bytes that are not a JSON object with a
/// string `status`, or whose `message.items` is not a list;
/// [`EnvelopeError::Status`] for a well-formed envelope whose status is not `ok`.
pub fn parse_envelope(body: &[u8]) -> Result<Envelope, EnvelopeError> {
    let value: Value = serde_json::from_slice(body).map_err(EnvelopeError::malformed)?;
    parse_envelope_value(value)
}

/// Like [`parse_envelope`], for an already-decoded JSON value.
///
/// # Errors
///
/// See [`parse_envelope`].
pub fn parse_envelope_value(value: Value) -> Result<Envelope, EnvelopeError> {
    let status = match value.get("status") {
        Some(Value::String(status)) => status.clone(),
        Some(other) => {
            return Err(EnvelopeError::malformed(format!(
                "status is not a string: {other}"
            )));
        }
        None => return Err(EnvelopeError::malformed("missing status")),
    };
    if status != STATUS_OK {
        return Err(EnvelopeError::Status { status });
    }
    serde_json::from_value(value).map_err(EnvelopeError::malformed)
}
