//! Operation codes.
//!
//! Ranges:
//! - `0x00xx`: session layer (handshake, keepalive, errors)
//! - `0x01xx`: client requests against a game session
//! - `0x02xx`: server broadcasts

/// Frame operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake
    Hello = 0x0001,
    /// Server handshake reply
    HelloReply = 0x0002,
    /// Keepalive request
    Ping = 0x0003,
    /// Keepalive reply
    Pong = 0x0004,
    /// Graceful disconnect
    Goodbye = 0x0005,
    /// Point-to-point error reply
    Error = 0x000F,

    /// Join (or rejoin) a session
    Join = 0x0100,
    /// Leave a session
    Leave = 0x0101,
    /// Pick a random first turn owner
    StartGame = 0x0102,
    /// Gameplay action with opaque stat updates
    GameAction = 0x0103,
    /// Advance the turn pointer by one
    EndTurn = 0x0104,
    /// Hand the turn to a named player
    NextTurn = 0x0105,
    /// Open an elimination vote
    StartVote = 0x0106,
    /// Cast or overwrite a ballot
    CastVote = 0x0107,
    /// Chat message (client request and server relay)
    Chat = 0x0108,
    /// Read a session's state without joining it
    GetSession = 0x0109,

    /// Full session state
    SessionState = 0x0200,
    /// Game started
    GameStarted = 0x0201,
    /// Current turn owner changed
    TurnUpdate = 0x0202,
    /// Gameplay action relayed
    ActionUpdate = 0x0203,
    /// Vote opened
    VoteStarted = 0x0204,
    /// Running tally after a ballot
    VoteUpdate = 0x0205,
    /// Vote resolved without elimination
    VoteTie = 0x0206,
    /// Vote eliminated a player
    PlayerEliminated = 0x0207,
    /// Final vote outcome
    VoteResult = 0x0208,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x0001 => Self::Hello,
            0x0002 => Self::HelloReply,
            0x0003 => Self::Ping,
            0x0004 => Self::Pong,
            0x0005 => Self::Goodbye,
            0x000F => Self::Error,
            0x0100 => Self::Join,
            0x0101 => Self::Leave,
            0x0102 => Self::StartGame,
            0x0103 => Self::GameAction,
            0x0104 => Self::EndTurn,
            0x0105 => Self::NextTurn,
            0x0106 => Self::StartVote,
            0x0107 => Self::CastVote,
            0x0108 => Self::Chat,
            0x0109 => Self::GetSession,
            0x0200 => Self::SessionState,
            0x0201 => Self::GameStarted,
            0x0202 => Self::TurnUpdate,
            0x0203 => Self::ActionUpdate,
            0x0204 => Self::VoteStarted,
            0x0205 => Self::VoteUpdate,
            0x0206 => Self::VoteTie,
            0x0207 => Self::PlayerEliminated,
            0x0208 => Self::VoteResult,
            _ => return None,
        })
    }

    /// Session-layer opcodes are handled by the connection state machine
    /// rather than routed to a game session.
    #[must_use]
    pub const fn is_session_layer(self) -> bool {
        matches!(self, Self::Hello | Self::HelloReply | Self::Ping | Self::Pong | Self::Goodbye)
    }
}
