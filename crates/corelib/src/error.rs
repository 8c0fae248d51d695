//! Error types for the core library.

use crate::node::Endpoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a transport while reaching an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing answered at this endpoint.
    #[error("endpoint {endpoint} is unreachable")]
    Unreachable { endpoint: Endpoint },
    /// The endpoint accepted the call but did not answer in time.
    #[error("call to {endpoint} timed out")]
    Timeout { endpoint: Endpoint },
    /// The payload could not be framed or unframed.
    #[error("codec failure: {0}")]
    Codec(String),
}

/// Errors that can occur anywhere in the ring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed topology. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A request was rejected before touching storage.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An endpoint could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The local storage engine failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// The remote node answered with something we did not ask for.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// True when the failure came from the transport rather than the remote node.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Classification of a failure carried back over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    Configuration,
    InvalidArgument,
    Storage,
    Protocol,
}

/// A server-side failure in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl From<&Error> for Fault {
    fn from(err: &Error) -> Self {
        let (kind, message) = match err {
            Error::Configuration(msg) => (FaultKind::Configuration, msg.clone()),
            Error::InvalidArgument(msg) => (FaultKind::InvalidArgument, msg.clone()),
            Error::Storage(msg) => (FaultKind::Storage, msg.clone()),
            Error::Protocol(msg) => (FaultKind::Protocol, msg.clone()),
            // Server handlers never return transport errors: forward failures
            // are logged and dropped. Anything else reaching here is a bug in
            // the handler, reported as a protocol fault with the cause kept.
            Error::Transport(inner) => (
                FaultKind::Protocol,
                format!("server-side transport failure: {inner}"),
            ),
        };
        Self { kind, message }
    }
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        match fault.kind {
            FaultKind::Configuration => Error::Configuration(fault.message),
            FaultKind::InvalidArgument => Error::InvalidArgument(fault.message),
            FaultKind::Storage => Error::Storage(fault.message),
            FaultKind::Protocol => Error::Protocol(fault.message),
        }
    }
}
