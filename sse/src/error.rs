//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other layers: a root Error struct holding
//! an error kind enum plus an optional source for error chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the sse crate.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the sse crate.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Hub(HubErrorKind),
    Codec(CodecErrorKind),
}

/// Errors from hub lifecycle and routing operations.
#[derive(Debug, PartialEq)]
pub enum HubErrorKind {
    /// `create_connection` was called while the registry is at `max_connections`.
    CapacityExceeded,
    /// The hub has begun shutdown; no new connections are admitted.
    ShuttingDown,
    /// A write to a single connection failed (queue full or peer gone).
    WriteFailed,
}

/// Errors from encoding the wire framing. Decoding never errors: malformed
/// records are dropped so the stream keeps flowing.
#[derive(Debug, PartialEq)]
pub enum CodecErrorKind {
    Serialize,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Hub(kind) => write!(f, "hub error: {:?}", kind),
            ErrorKind::Codec(kind) => write!(f, "codec error: {:?}", kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Codec(CodecErrorKind::Serialize),
        }
    }
}

/// Helper function to create hub errors.
pub fn hub_error(kind: HubErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Hub(kind),
    }
}
