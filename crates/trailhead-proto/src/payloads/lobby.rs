//! Client requests against a game session.
//!
//! Every request names its target session by `session_key`. Player
//! references on the wire are display names; the server resolves them
//! against the session roster.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Player profile declared by the client on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Display name, unique within a session
    pub name: String,
    /// Avatar or other display metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Opaque gameplay stats
    #[serde(default)]
    pub stats: Bytes,
}

/// Join (or rejoin) a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Target session
    pub session_key: String,
    /// Declared player profile
    pub player: PlayerProfile,
}

/// Request that only names a session (leave, start game, end turn).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    /// Target session
    pub session_key: String,
}

/// Hand the turn to a named player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTurn {
    /// Target session
    pub session_key: String,
    /// Player who should own the turn next
    pub player_name: String,
}

/// Kind of gameplay action being relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Move along the trail
    Walk {
        /// Distance covered, as computed by the client
        move_amount: i64,
    },
    /// Build a fire
    MakeFire,
    /// Any other named action
    Other(String),
}

/// New stats for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsUpdate {
    /// Player display name
    pub name: String,
    /// Replacement stats blob
    pub stats: Bytes,
}

/// Gameplay action with stat updates computed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAction {
    /// Target session
    pub session_key: String,
    /// What happened
    pub kind: ActionKind,
    /// Stats to write onto the named players
    #[serde(default)]
    pub stats_updates: Vec<StatsUpdate>,
}

/// Open an elimination vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartVote {
    /// Target session
    pub session_key: String,
    /// Player under consideration (advisory)
    pub target: String,
}

/// Cast or overwrite a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastVote {
    /// Target session
    pub session_key: String,
    /// Voting player
    pub voter: String,
    /// Player voted out
    pub choice: String,
}

/// Chat message. Sent by clients and relayed verbatim by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Target session
    pub session_key: String,
    /// Declared author
    pub author: String,
    /// Message text
    pub body: String,
}
