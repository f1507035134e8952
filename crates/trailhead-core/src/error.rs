//! Error types for the Trailhead core.
//!
//! Two layers: connection errors (handshake, timeout, state transitions) and
//! session errors (rejected lobby, turn and vote operations). Session errors
//! never close a connection; they are answered with a point-to-point error
//! frame and the session state is left untouched.

use std::{io, time::Duration};

use thiserror::Error;
use trailhead_proto::ErrorPayload;

use crate::{connection::ConnectionState, player::ConnectionId};

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: String,
    },

    /// Received unexpected frame for current state
    #[error("unexpected frame: received opcode {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// Current state when frame was received
        state: ConnectionState,
        /// Opcode of the unexpected frame
        opcode: u16,
    },

    /// Handshake did not complete within timeout
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Connection idle timeout exceeded
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// How long connection was idle
        elapsed: Duration,
    },

    /// Unsupported protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid payload for opcode
    #[error("invalid payload: expected {expected} for opcode {opcode:#06x}")]
    InvalidPayload {
        /// Expected payload type
        expected: &'static str,
        /// Opcode that was received
        opcode: u16,
    },

    /// Protocol error from frame parsing/validation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Protocol violations (invalid frames, unsupported versions) are never
    /// transient; they indicate a broken or malicious peer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. } | Self::IdleTimeout { .. })
    }
}

/// Convert `ConnectionError` to `io::Error` at async I/O boundaries.
impl From<ConnectionError> for io::Error {
    fn from(err: ConnectionError) -> Self {
        let kind = match &err {
            ConnectionError::HandshakeTimeout { .. } | ConnectionError::IdleTimeout { .. } => {
                io::ErrorKind::TimedOut
            },
            ConnectionError::InvalidState { .. }
            | ConnectionError::UnexpectedFrame { .. }
            | ConnectionError::UnsupportedVersion(_)
            | ConnectionError::Protocol(_)
            | ConnectionError::InvalidPayload { .. } => io::ErrorKind::InvalidData,
            ConnectionError::Transport(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<trailhead_proto::ProtocolError> for ConnectionError {
    fn from(err: trailhead_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Rejected session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session exists under this key
    #[error("session not found: {key}")]
    SessionNotFound {
        /// Requested session key
        key: String,
    },

    /// Ballot or deadline handling without an open vote
    #[error("no vote is active")]
    VoteNotActive,

    /// A vote is already open in this session
    #[error("a vote is already active")]
    VoteAlreadyActive,

    /// Ballot names a voter that is not in the roster
    #[error("voter not in roster: {name}")]
    VoterNotInRoster {
        /// Declared voter name
        name: String,
    },

    /// Operation requires a roster state that does not hold
    #[error("invalid roster state: {reason}")]
    InvalidRosterState {
        /// What was wrong
        reason: String,
    },

    /// The acting connection has no roster entry in this session
    #[error("connection {connection_id:#018x} is not a member")]
    NotAMember {
        /// Acting connection
        connection_id: ConnectionId,
    },

    /// The acting connection claimed a roster entry it is not bound to
    #[error("connection {connection_id:#018x} cannot act as {claimed}")]
    IdentityMismatch {
        /// Name the connection claimed
        claimed: String,
        /// Acting connection
        connection_id: ConnectionId,
    },

    /// The acting connection does not own the current turn
    #[error("connection {connection_id:#018x} does not own the turn")]
    NotTurnOwner {
        /// Acting connection
        connection_id: ConnectionId,
    },

    /// Named player is not in the roster
    #[error("unknown player: {name}")]
    UnknownPlayer {
        /// Requested name
        name: String,
    },
}

impl SessionError {
    /// Wire error code for this rejection.
    pub fn code(&self) -> u16 {
        match self {
            Self::SessionNotFound { .. } => ErrorPayload::SESSION_NOT_FOUND,
            Self::VoteNotActive => ErrorPayload::VOTE_NOT_ACTIVE,
            Self::VoteAlreadyActive => ErrorPayload::VOTE_ALREADY_ACTIVE,
            Self::VoterNotInRoster { .. } => ErrorPayload::VOTER_NOT_IN_ROSTER,
            Self::InvalidRosterState { .. } => ErrorPayload::INVALID_ROSTER_STATE,
            Self::NotAMember { .. } => ErrorPayload::NOT_A_MEMBER,
            Self::IdentityMismatch { .. } => ErrorPayload::IDENTITY_MISMATCH,
            Self::NotTurnOwner { .. } => ErrorPayload::NOT_TURN_OWNER,
            Self::UnknownPlayer { .. } => ErrorPayload::UNKNOWN_PLAYER,
        }
    }

    /// Build the error payload sent back to the rejected connection.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.code(), self.to_string())
    }
}
