//! Server broadcasts to every connection subscribed to a session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::lobby::{ActionKind, StatsUpdate};

/// One roster entry as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Server-assigned player identifier, stable across rejoins
    pub id: u64,
    /// Display name
    pub name: String,
    /// Current connection identifier
    pub connection_id: u64,
    /// Avatar or other display metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Opaque gameplay stats
    pub stats: Bytes,
}

/// One recorded ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Voting player
    pub voter: String,
    /// Player voted out
    pub choice: String,
}

/// Ballot count for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    /// Candidate display name
    pub name: String,
    /// Number of ballots naming the candidate
    pub votes: u32,
}

/// State of an open vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSnapshot {
    /// Advisory target named when the vote opened
    pub target: String,
    /// Ballots in roster order of the voter
    pub ballots: Vec<Ballot>,
    /// Per-candidate counts, highest first
    pub tally: Vec<TallyEntry>,
    /// Ballots still required for quorum
    pub outstanding: u32,
}

/// Full session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session key
    pub session_key: String,
    /// Roster in turn order
    pub players: Vec<PlayerInfo>,
    /// Turn pointer; always a valid index when `players` is non-empty, 0
    /// otherwise
    pub turn_index: u32,
    /// Name of the current turn owner once the game has started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player: Option<String>,
    /// Open vote, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteSnapshot>,
}

/// Game started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStarted {
    /// State right after the first turn owner was chosen
    pub state: SessionState,
}

/// Turn owner changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnUpdate {
    /// Session key
    pub session_key: String,
    /// Name of the player whose turn it is
    pub current_player: String,
}

/// Gameplay action relayed to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUpdate {
    /// Session key
    pub session_key: String,
    /// Name of the acting player
    pub actor: String,
    /// What happened
    pub kind: ActionKind,
    /// Stats as supplied by the actor
    pub stats_updates: Vec<StatsUpdate>,
}

/// Vote opened, or running tally after a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteUpdate {
    /// Session key
    pub session_key: String,
    /// Vote state
    pub vote: VoteSnapshot,
}

/// Vote ended in a tie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTie {
    /// Session key
    pub session_key: String,
    /// Candidates sharing the highest count
    pub candidates: Vec<String>,
    /// Final vote state
    pub vote: VoteSnapshot,
}

/// Player removed by vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEliminated {
    /// Session key
    pub session_key: String,
    /// Eliminated player's display name
    pub name: String,
}

/// How a vote ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOutcome {
    /// Single winner removed from the roster
    Eliminated {
        /// Eliminated player's display name
        name: String,
    },
    /// Several candidates shared the highest count
    Tie,
    /// The winner had already left the session; nobody was removed
    Void {
        /// The departed winner's display name
        name: String,
    },
    /// Vote discarded without a result (deadline or empty roster)
    Cancelled,
}

/// Final vote outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResult {
    /// Session key
    pub session_key: String,
    /// Outcome
    pub outcome: VoteOutcome,
}
