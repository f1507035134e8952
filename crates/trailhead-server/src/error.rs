//! Runtime error types.

use std::fmt;

use crate::server_error::{DriverError, ExecutorError};

/// Errors that can occur in the production server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing TLS certs, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (connection failure, I/O error, etc.).
    Transport(String),

    /// Protocol error (invalid frame format, unsupported version, etc.).
    ///
    /// Fatal for that connection only.
    Protocol(String),

    /// Internal error. Indicates a bug.
    Internal(String),

    /// Error from [`crate::ServerDriver`] processing.
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<ExecutorError> for ServerError {
    fn from(err: ExecutorError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<trailhead_proto::ProtocolError> for ServerError {
    fn from(err: trailhead_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
