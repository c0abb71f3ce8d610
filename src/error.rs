//! Error types for the RPC session and the proxy facade.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::value::Value;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by a session or by a facade call.
///
/// `Protocol` and `ConnectionClosed` are session-wide: once either is seen
/// the session is closed and every later call fails with `ConnectionClosed`.
/// `Rpc`, `Cancelled` and `Timeout` only ever concern the one call that
/// returned them.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream could not be established.
    #[error("Connection failed: {0}")]
    Connection(#[source] std::io::Error),

    /// Undecodable bytes or a structurally invalid message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote reported a failure for this call.
    #[error("Remote error: {0}")]
    Rpc(RemoteError),

    /// The stream closed while the call was outstanding, or before it was made.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The caller abandoned the call before a response arrived.
    #[error("Call cancelled")]
    Cancelled,

    /// The call's deadline passed. The pending entry has been dropped.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// An outgoing message could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The method is not part of the catalogue for this proxy type.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// A required positional argument was not supplied.
    #[error("{method}: missing argument `{param}`")]
    MissingArgument {
        method: &'static str,
        param: &'static str,
    },

    /// More positional arguments than the method accepts.
    #[error("{method}: expected {expected} arguments, got {got}")]
    TooManyArguments {
        method: &'static str,
        expected: usize,
        got: usize,
    },

    /// The decoded result did not have the type the caller asked for.
    #[error("Unexpected value: expected {expected}, got {got}")]
    UnexpectedValue { expected: &'static str, got: String },
}

impl Error {
    /// True for both explicit cancellation and an elapsed deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout(_))
    }

    /// True for the errors that end the whole session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::ConnectionClosed)
    }

    pub(crate) fn unexpected(expected: &'static str, got: &Value) -> Self {
        Error::UnexpectedValue {
            expected,
            got: got.type_name().to_string(),
        }
    }
}

/// Error payload sent by the remote in a failed response, kept verbatim.
///
/// Neovim sends `[error_type, message]`, but other peers may send any
/// value, so the payload is not interpreted beyond `message()`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub payload: Value,
}

impl RemoteError {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// The human readable part of the payload, if there is one.
    pub fn message(&self) -> Option<&str> {
        match &self.payload {
            Value::String(s) => Some(s),
            Value::Array(items) => items.iter().rev().find_map(Value::as_str),
            Value::Map(map) => map.get("message").and_then(Value::as_str),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Value::Array(items) if !items.is_empty() => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join(": "))
            }
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Why a session stopped. Turned into an [`Error`] for each call it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseReason {
    Closed,
    Protocol(String),
}

impl CloseReason {
    pub(crate) fn to_error(&self) -> Error {
        match self {
            CloseReason::Closed => Error::ConnectionClosed,
            CloseReason::Protocol(msg) => Error::Protocol(msg.clone()),
        }
    }
}
