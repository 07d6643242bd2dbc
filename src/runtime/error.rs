//! Error types for the Slim runtime
//!
//! Transport and protocol failures end a session and surface as
//! [`ServiceError`] on the server and [`ClientError`] on the client.
//! Fixture failures never do: they are reported per statement through
//! [`InvokeError`] and [`CreateError`] and end up encoded in the response.

use crate::protocol::{CodecError, ProtocolError};
use std::io;
use thiserror::Error;

/// Failure raised by fixture code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FixtureError {
    /// Message reported to the client
    pub message: String,
    /// Whether the rest of the batch must be abandoned
    pub stop_test: bool,
}

impl FixtureError {
    /// Ordinary failure; later statements still run.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stop_test: false,
        }
    }

    /// Failure that halts the remainder of the batch.
    pub fn stop_test(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stop_test: true,
        }
    }
}

/// Failure to invoke a method on a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// No method matches the name and argument count
    #[error("no method {method} taking {arity} arguments")]
    NoMethod {
        /// Requested method name
        method: String,
        /// Number of arguments supplied
        arity: usize,
    },

    /// The method ran and failed
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Failure to construct a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateError {
    /// No constructor takes that many arguments
    #[error("no constructor taking {arity} arguments")]
    NoConstructor {
        /// Number of arguments supplied
        arity: usize,
    },

    /// The constructor ran and failed
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Invalid service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The named interaction strategy does not exist
    #[error("unknown interaction strategy '{name}' (available: {available})")]
    UnknownInteraction {
        /// Requested name
        name: String,
        /// Comma-separated list of known strategies
        available: String,
    },
}

/// Errors that end a server-side session.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed bytes on the stream
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Well-formed bytes that violate the protocol
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors surfaced by [`crate::runtime::service_client::SlimClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open a connection; the caller may retry.
    #[error("could not connect to {addr}: {source}")]
    Connection {
        /// Address that was attempted
        addr: String,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// The host name resolved to no address.
    #[error("no address resolved for {0}")]
    NoAddress(String),

    /// The client was used after `close` or after a fatal error.
    #[error("not connected")]
    NotConnected,

    /// IO error on an established connection
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed bytes from the server
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol violation, including version mismatch
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Whether retrying the connection might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Connection { .. })
    }

    /// Whether a configured read timeout expired.
    pub fn is_timeout(&self) -> bool {
        let io_err = match self {
            ClientError::Io(err) | ClientError::Codec(CodecError::Io(err)) => err,
            ClientError::Protocol(ProtocolError::Codec(CodecError::Io(err))) => err,
            _ => return false,
        };
        matches!(
            io_err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        )
    }
}

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Result type for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
