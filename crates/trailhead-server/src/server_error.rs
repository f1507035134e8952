//! Driver error types.
//!
//! Session operations that are rejected never surface here; they are answered
//! with an error frame to the acting connection. These errors cover driver
//! misuse by the runtime (unknown or duplicate connection ids) and action
//! execution failures.

use std::fmt;

/// Errors returned by [`crate::ServerDriver::process_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Connection not found.
    ///
    /// The runtime delivered an event for a connection id that was never
    /// accepted or was already closed. Usually a race with disconnect.
    ConnectionNotFound(u64),

    /// Connection already registered.
    ///
    /// The runtime reused a live connection id. Connection ids are random
    /// `u64`s, so this indicates a bug in the runtime.
    ConnectionAlreadyExists(u64),

    /// Frame encoding failed while building a reply or broadcast.
    Protocol(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionNotFound(id) => write!(f, "connection not found: {id:#018x}"),
            Self::ConnectionAlreadyExists(id) => {
                write!(f, "connection already exists: {id:#018x}")
            },
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<trailhead_proto::ProtocolError> for DriverError {
    fn from(err: trailhead_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errors from action execution.
#[derive(Debug)]
pub enum ExecutorError {
    /// Send to a connection failed.
    ///
    /// The outbound stream is closed or broken. Transient; the client can
    /// reconnect and rejoin by name.
    SendFailed {
        /// Connection that failed
        connection_id: u64,
        /// Error message
        reason: String,
    },

    /// Transport error.
    ///
    /// Low-level network/QUIC error.
    Transport(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendFailed { connection_id, reason } => {
                write!(f, "send failed for connection {connection_id:#018x}: {reason}")
            },
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ExecutorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let err = DriverError::ConnectionNotFound(42);
        assert_eq!(err.to_string(), "connection not found: 0x000000000000002a");

        let err = DriverError::Protocol("bad cbor".to_string());
        assert_eq!(err.to_string(), "protocol error: bad cbor");
    }

    #[test]
    fn executor_error_display() {
        let err = ExecutorError::SendFailed { connection_id: 1, reason: "closed".to_string() };
        assert_eq!(err.to_string(), "send failed for connection 0x0000000000000001: closed");

        let err = ExecutorError::Transport("reset".to_string());
        assert_eq!(err.to_string(), "transport error: reset");
    }

    #[test]
    fn protocol_error_converts() {
        let err: DriverError = trailhead_proto::ProtocolError::UnknownOpcode(0x0999).into();
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
