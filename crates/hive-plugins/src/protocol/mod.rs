//! Call envelope types and their wire codec.
//!
//! After the handshake the host writes one [`CallRequest`] at a time and the
//! plugin answers each with exactly one [`CallResponse`]. Envelopes are
//! encoded as CBOR items written back-to-back on the stream; CBOR is
//! self-delimiting, so no extra framing is needed. Payloads travel as CBOR
//! byte strings and are never interpreted by this crate.

use std::io::{self, BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request sent from the host to the plugin for one invocation.
///
/// # Example
///
/// ```
/// use hive_plugins::CallRequest;
///
/// let request = CallRequest::new("lobby", "hello", b"world".to_vec());
/// assert_eq!(request.service(), "lobby");
/// assert_eq!(request.name(), "hello");
/// assert_eq!(request.payload(), b"world");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRequest {
    service: String,
    name: String,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

impl CallRequest {
    /// Creates a request for operation `name` on `service`.
    #[must_use]
    pub fn new(service: impl Into<String>, name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            payload,
        }
    }

    /// Returns the service the request is addressed to.
    #[must_use]
    pub const fn service(&self) -> &str {
        self.service.as_str()
    }

    /// Returns the operation name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the opaque request payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Response sent from the plugin to the host for one invocation.
///
/// A set `error` marks the call as failed regardless of `status` and
/// `payload`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallResponse {
    status: i32,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CallResponse {
    /// Creates a successful response.
    #[must_use]
    pub const fn new(status: i32, payload: Vec<u8>) -> Self {
        Self {
            status,
            payload,
            error: None,
        }
    }

    /// Creates a failed response with zero status and no payload.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: 0,
            payload: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> i32 {
        self.status
    }

    /// Returns the response payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the error text, if the call failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns whether the call failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits the response into status, payload and error.
    #[must_use]
    pub fn into_parts(self) -> (i32, Vec<u8>, Option<String>) {
        (self.status, self.payload, self.error)
    }

    pub(crate) fn set_reply(&mut self, status: i32, payload: Vec<u8>) {
        self.status = status;
        self.payload = payload;
    }

    pub(crate) fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }
}

/// Errors raised while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
    /// The bytes on the stream were not a valid envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(String),
    /// The stream failed while reading or writing.
    #[error("envelope I/O failed: {0}")]
    Io(#[source] io::Error),
}

impl CodecError {
    /// Converts the error into an I/O error when it came from the stream.
    #[must_use]
    pub fn into_io(self) -> Result<io::Error, Self> {
        match self {
            Self::Io(error) => Ok(error),
            other => Err(other),
        }
    }
}

/// Writes one envelope and flushes the writer.
///
/// # Errors
///
/// Returns [`CodecError::Io`] when the stream fails and
/// [`CodecError::Encode`] when the value cannot be serialised.
pub fn write_message<T: Serialize>(writer: &mut impl Write, message: &T) -> Result<(), CodecError> {
    ciborium::into_writer(message, &mut *writer).map_err(|err| match err {
        ciborium::ser::Error::Io(source) => CodecError::Io(source),
        ciborium::ser::Error::Value(message) => CodecError::Encode(message),
    })?;
    writer.flush().map_err(CodecError::Io)
}

/// Reads one envelope, returning `None` when the peer closed the stream
/// cleanly before a new envelope started.
///
/// # Errors
///
/// Returns [`CodecError::Io`] when the stream fails (including EOF in the
/// middle of an envelope) and [`CodecError::Decode`] for malformed input.
pub fn read_message<T: DeserializeOwned>(
    reader: &mut impl BufRead,
) -> Result<Option<T>, CodecError> {
    if reader.fill_buf().map_err(CodecError::Io)?.is_empty() {
        return Ok(None);
    }
    ciborium::from_reader(&mut *reader)
        .map(Some)
        .map_err(|err| match err {
            ciborium::de::Error::Io(source) => CodecError::Io(source),
            other => CodecError::Decode(other.to_string()),
        })
}
