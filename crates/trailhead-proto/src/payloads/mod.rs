//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary; payloads use CBOR for type safety and
//! forward compatibility. The `Payload` enum covers every message type:
//! session management, client requests, and server broadcasts.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). The variant tag is never serialized; the header opcode
//! identifies the payload type.

pub mod broadcast;
pub mod lobby;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session layer
    /// Client handshake
    Hello(session::Hello),
    /// Server handshake reply
    HelloReply(session::HelloReply),
    /// Keepalive request
    Ping,
    /// Keepalive reply
    Pong,
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Point-to-point error reply
    Error(ErrorPayload),

    // Client requests
    /// Join (or rejoin) a session
    Join(lobby::Join),
    /// Leave a session
    Leave(lobby::SessionRef),
    /// Start the game
    StartGame(lobby::SessionRef),
    /// Gameplay action relay
    GameAction(lobby::GameAction),
    /// Advance the turn
    EndTurn(lobby::SessionRef),
    /// Hand the turn to a named player
    NextTurn(lobby::NextTurn),
    /// Open a vote
    StartVote(lobby::StartVote),
    /// Cast a ballot
    CastVote(lobby::CastVote),
    /// Chat message (both directions)
    Chat(lobby::ChatMessage),
    /// Read-only state query, answered point-to-point
    GetSession(lobby::SessionRef),

    // Server broadcasts
    /// Full session state
    SessionState(broadcast::SessionState),
    /// Game started
    GameStarted(broadcast::GameStarted),
    /// Turn owner changed
    TurnUpdate(broadcast::TurnUpdate),
    /// Gameplay action relayed
    ActionUpdate(broadcast::ActionUpdate),
    /// Vote opened
    VoteStarted(broadcast::VoteUpdate),
    /// Running tally
    VoteUpdate(broadcast::VoteUpdate),
    /// Tie
    VoteTie(broadcast::VoteTie),
    /// Elimination
    PlayerEliminated(broadcast::PlayerEliminated),
    /// Final outcome
    VoteResult(broadcast::VoteResult),
}

/// Error payload for error frames.
///
/// Sent only to the connection whose request was rejected; the frame header
/// echoes the request id of the rejected frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Frame was rejected (malformed, wrong direction, unexpected).
    pub const FRAME_REJECTED: u16 = 0x0001;
    /// Payload could not be decoded.
    pub const INVALID_PAYLOAD: u16 = 0x0002;
    /// Handshake not completed.
    pub const NOT_AUTHENTICATED: u16 = 0x0003;
    /// Session key unknown.
    pub const SESSION_NOT_FOUND: u16 = 0x0010;
    /// No vote is open.
    pub const VOTE_NOT_ACTIVE: u16 = 0x0011;
    /// A vote is already open.
    pub const VOTE_ALREADY_ACTIVE: u16 = 0x0012;
    /// Ballot from a name not in the roster.
    pub const VOTER_NOT_IN_ROSTER: u16 = 0x0013;
    /// Operation needs a roster state that does not hold.
    pub const INVALID_ROSTER_STATE: u16 = 0x0014;
    /// Connection has no roster entry in the session.
    pub const NOT_A_MEMBER: u16 = 0x0015;
    /// Connection acted as a player it is not bound to.
    pub const IDENTITY_MISMATCH: u16 = 0x0016;
    /// Connection does not own the current turn.
    pub const NOT_TURN_OWNER: u16 = 0x0017;
    /// Named player not in the roster.
    pub const UNKNOWN_PLAYER: u16 = 0x0018;

    /// Create an error with the given code.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Create a frame rejection error.
    pub fn frame_rejected(reason: impl Into<String>) -> Self {
        Self::new(Self::FRAME_REJECTED, reason)
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PAYLOAD, msg)
    }

    /// Create a not-authenticated error.
    pub fn not_authenticated() -> Self {
        Self::new(Self::NOT_AUTHENTICATED, "handshake not completed")
    }
}

fn write_cbor<T: Serialize>(value: &T, dst: &mut impl BufMut) -> Result<()> {
    ciborium::ser::into_writer(value, dst.writer())
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn read_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Error(_) => Opcode::Error,
            Self::Join(_) => Opcode::Join,
            Self::Leave(_) => Opcode::Leave,
            Self::StartGame(_) => Opcode::StartGame,
            Self::GameAction(_) => Opcode::GameAction,
            Self::EndTurn(_) => Opcode::EndTurn,
            Self::NextTurn(_) => Opcode::NextTurn,
            Self::StartVote(_) => Opcode::StartVote,
            Self::CastVote(_) => Opcode::CastVote,
            Self::Chat(_) => Opcode::Chat,
            Self::GetSession(_) => Opcode::GetSession,
            Self::SessionState(_) => Opcode::SessionState,
            Self::GameStarted(_) => Opcode::GameStarted,
            Self::TurnUpdate(_) => Opcode::TurnUpdate,
            Self::ActionUpdate(_) => Opcode::ActionUpdate,
            Self::VoteStarted(_) => Opcode::VoteStarted,
            Self::VoteUpdate(_) => Opcode::VoteUpdate,
            Self::VoteTie(_) => Opcode::VoteTie,
            Self::PlayerEliminated(_) => Opcode::PlayerEliminated,
            Self::VoteResult(_) => Opcode::VoteResult,
        }
    }

    /// Session key this payload targets, for payloads that name one.
    #[must_use]
    pub fn session_key(&self) -> Option<&str> {
        match self {
            Self::Join(p) => Some(&p.session_key),
            Self::Leave(p) | Self::StartGame(p) | Self::EndTurn(p) | Self::GetSession(p) => {
                Some(&p.session_key)
            },
            Self::GameAction(p) => Some(&p.session_key),
            Self::NextTurn(p) => Some(&p.session_key),
            Self::StartVote(p) => Some(&p.session_key),
            Self::CastVote(p) => Some(&p.session_key),
            Self::Chat(p) => Some(&p.session_key),
            Self::SessionState(p) => Some(&p.session_key),
            Self::GameStarted(p) => Some(&p.state.session_key),
            Self::TurnUpdate(p) => Some(&p.session_key),
            Self::ActionUpdate(p) => Some(&p.session_key),
            Self::VoteStarted(p) | Self::VoteUpdate(p) => Some(&p.session_key),
            Self::VoteTie(p) => Some(&p.session_key),
            Self::PlayerEliminated(p) => Some(&p.session_key),
            Self::VoteResult(p) => Some(&p.session_key),
            Self::Hello(_)
            | Self::HelloReply(_)
            | Self::Ping
            | Self::Pong
            | Self::Goodbye(_)
            | Self::Error(_) => None,
        }
    }

    /// Encode payload to buffer.
    ///
    /// Serializes only the inner struct, not the variant tag.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Ping | Self::Pong => Ok(()), // Zero-byte payloads
            Self::Hello(inner) => write_cbor(inner, dst),
            Self::HelloReply(inner) => write_cbor(inner, dst),
            Self::Goodbye(inner) => write_cbor(inner, dst),
            Self::Error(inner) => write_cbor(inner, dst),
            Self::Join(inner) => write_cbor(inner, dst),
            Self::Leave(inner)
            | Self::StartGame(inner)
            | Self::EndTurn(inner)
            | Self::GetSession(inner) => write_cbor(inner, dst),
            Self::GameAction(inner) => write_cbor(inner, dst),
            Self::NextTurn(inner) => write_cbor(inner, dst),
            Self::StartVote(inner) => write_cbor(inner, dst),
            Self::CastVote(inner) => write_cbor(inner, dst),
            Self::Chat(inner) => write_cbor(inner, dst),
            Self::SessionState(inner) => write_cbor(inner, dst),
            Self::GameStarted(inner) => write_cbor(inner, dst),
            Self::TurnUpdate(inner) => write_cbor(inner, dst),
            Self::ActionUpdate(inner) => write_cbor(inner, dst),
            Self::VoteStarted(inner) | Self::VoteUpdate(inner) => write_cbor(inner, dst),
            Self::VoteTie(inner) => write_cbor(inner, dst),
            Self::PlayerEliminated(inner) => write_cbor(inner, dst),
            Self::VoteResult(inner) => write_cbor(inner, dst),
        }
    }

    /// Decode payload from bytes based on opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::Hello => Self::Hello(read_cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(read_cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(read_cbor(bytes)?),
            Opcode::Error => Self::Error(read_cbor(bytes)?),
            Opcode::Join => Self::Join(read_cbor(bytes)?),
            Opcode::Leave => Self::Leave(read_cbor(bytes)?),
            Opcode::StartGame => Self::StartGame(read_cbor(bytes)?),
            Opcode::GameAction => Self::GameAction(read_cbor(bytes)?),
            Opcode::EndTurn => Self::EndTurn(read_cbor(bytes)?),
            Opcode::NextTurn => Self::NextTurn(read_cbor(bytes)?),
            Opcode::StartVote => Self::StartVote(read_cbor(bytes)?),
            Opcode::CastVote => Self::CastVote(read_cbor(bytes)?),
            Opcode::Chat => Self::Chat(read_cbor(bytes)?),
            Opcode::GetSession => Self::GetSession(read_cbor(bytes)?),
            Opcode::SessionState => Self::SessionState(read_cbor(bytes)?),
            Opcode::GameStarted => Self::GameStarted(read_cbor(bytes)?),
            Opcode::TurnUpdate => Self::TurnUpdate(read_cbor(bytes)?),
            Opcode::ActionUpdate => Self::ActionUpdate(read_cbor(bytes)?),
            Opcode::VoteStarted => Self::VoteStarted(read_cbor(bytes)?),
            Opcode::VoteUpdate => Self::VoteUpdate(read_cbor(bytes)?),
            Opcode::VoteTie => Self::VoteTie(read_cbor(bytes)?),
            Opcode::PlayerEliminated => Self::PlayerEliminated(read_cbor(bytes)?),
            Opcode::VoteResult => Self::VoteResult(read_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Build a frame with a fresh header for this payload's opcode.
    pub fn to_frame(&self) -> Result<Frame> {
        self.clone().into_frame(FrameHeader::new(self.opcode()))
    }

    /// Parse payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the opcode is not recognized
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn ping_has_empty_payload() {
        let frame = Payload::Ping.to_frame().expect("should create frame");
        assert_eq!(frame.header.payload_size(), 0);
        assert_eq!(Payload::from_frame(&frame).expect("should parse"), Payload::Ping);
    }

    #[test]
    fn join_survives_the_wire() {
        let payload = Payload::Join(lobby::Join {
            session_key: "L1".to_string(),
            player: lobby::PlayerProfile {
                name: "alice".to_string(),
                avatar: Some("fox".to_string()),
                stats: Bytes::from_static(&[0xA1, 0x01, 0x02]),
            },
        });

        let wire = payload.to_frame().and_then(|f| f.to_vec()).expect("should encode");
        let frame = Frame::decode(&wire).expect("should decode frame");

        assert_eq!(frame.header.opcode_enum(), Some(Opcode::Join));
        assert_eq!(Payload::from_frame(&frame).expect("should parse"), payload);
        assert_eq!(payload.session_key(), Some("L1"));
    }

    #[test]
    fn error_payload_keeps_request_id() {
        let mut header = FrameHeader::new(Opcode::Error);
        header.set_request_id(42);
        let frame = Payload::Error(ErrorPayload::invalid_payload("bad"))
            .into_frame(header)
            .expect("should create frame");

        assert_eq!(frame.header.request_id(), 42);
        let Payload::Error(err) = Payload::from_frame(&frame).expect("should parse") else {
            panic!("expected error payload");
        };
        assert_eq!(err.code, ErrorPayload::INVALID_PAYLOAD);
    }

    #[test]
    fn mismatched_opcode_fails_to_decode() {
        let frame = Payload::Chat(lobby::ChatMessage {
            session_key: "L1".to_string(),
            author: "a".to_string(),
            body: "hi".to_string(),
        })
        .to_frame()
        .expect("should create frame");

        assert!(matches!(
            Payload::decode(Opcode::CastVote, &frame.payload),
            Err(ProtocolError::CborDecode(_))
        ));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut frame = Payload::Ping.to_frame().expect("should create frame");
        frame.header.opcode = 0x7777u16.to_be_bytes();

        assert_eq!(Payload::from_frame(&frame), Err(ProtocolError::UnknownOpcode(0x7777)));
    }
}
