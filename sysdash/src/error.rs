//! Error taxonomy for the telemetry core.
//!
//! Only [`ConnectionError`] is ever surfaced to a user. Decode and reader failures are
//! absorbed where they happen and only show up in logs and hub counters.

use thiserror::Error;

/// An inbound payload could not be turned into a snapshot.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not well-formed JSON, or a field has an incompatible shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Well-formed JSON, but the top-level value is not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A binary frame that is not valid UTF-8 text.
    #[error("binary frame is not UTF-8")]
    NotUtf8,
}

/// The upstream feed is unavailable. Terminal for a given hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed by peer")]
    ClosedByPeer,

    /// Closed locally, either explicitly or because the last reader went away.
    #[error("connection shut down")]
    Shutdown,
}

/// Returned by a reader that failed to process one snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reader failed: {0}")]
pub struct ReaderError(pub String);

impl ReaderError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
