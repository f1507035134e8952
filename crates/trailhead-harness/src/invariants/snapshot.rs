//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the server at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::{collections::BTreeSet, time::Instant};

use trailhead_core::{ConnectionId, Session, env::Environment};
use trailhead_server::ServerDriver;

/// Snapshot of every live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSnapshot {
    /// Per-session state, ordered by key.
    pub sessions: Vec<SessionSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no sessions).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot from explicit sessions.
    pub fn from_sessions(sessions: Vec<SessionSnapshot>) -> Self {
        Self { sessions }
    }

    /// Capture the sessions of a running driver.
    pub fn from_driver<E>(driver: &ServerDriver<E>) -> Self
    where
        E: Environment<Instant = Instant>,
    {
        let sessions = driver
            .sessions()
            .keys()
            .into_iter()
            .filter_map(|key| {
                let session = driver.session(&key)?;
                Some(SessionSnapshot::capture(session, driver.subscribers(&key)))
            })
            .collect();

        Self { sessions }
    }

    /// Session by key.
    pub fn session(&self, key: &str) -> Option<&SessionSnapshot> {
        self.sessions.iter().find(|s| s.key == key)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    /// Player id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Bound connection
    pub connection_id: ConnectionId,
}

/// Snapshot of one session's observable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session key.
    pub key: String,
    /// Roster in turn order.
    pub players: Vec<PlayerSnapshot>,
    /// Raw turn pointer.
    pub turn_index: usize,
    /// Open vote target, if any.
    pub vote_target: Option<String>,
    /// Player ids holding a ballot in the open vote.
    pub voters: BTreeSet<u64>,
    /// Connections receiving this session's broadcasts.
    pub subscribers: BTreeSet<ConnectionId>,
}

impl SessionSnapshot {
    /// Create an empty session snapshot.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), ..Default::default() }
    }

    fn capture(session: &Session<Instant>, subscribers: Vec<ConnectionId>) -> Self {
        let players = session
            .roster()
            .players()
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id.get(),
                name: p.name.clone(),
                connection_id: p.connection_id,
            })
            .collect();

        let vote = session.votes().active();

        Self {
            key: session.key().to_string(),
            players,
            turn_index: session.turns().index(),
            vote_target: vote.map(|v| v.target().to_string()),
            voters: vote.map(|v| v.voters().map(|id| id.get()).collect()).unwrap_or_default(),
            subscribers: subscribers.into_iter().collect(),
        }
    }

    /// Add a player.
    pub fn with_player(mut self, id: u64, name: &str, connection_id: ConnectionId) -> Self {
        self.players.push(PlayerSnapshot { id, name: name.to_string(), connection_id });
        self.subscribers.insert(connection_id);
        self
    }

    /// Set the turn pointer.
    pub fn with_turn_index(mut self, index: usize) -> Self {
        self.turn_index = index;
        self
    }

    /// Open a vote with the given voters.
    pub fn with_vote(mut self, target: &str, voters: impl IntoIterator<Item = u64>) -> Self {
        self.vote_target = Some(target.to_string());
        self.voters.extend(voters);
        self
    }

    /// Display names in turn order.
    pub fn names(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.name.as_str()).collect()
    }

    /// Current turn owner's name, if the pointer is in range.
    pub fn turn_owner(&self) -> Option<&str> {
        self.players.get(self.turn_index).map(|p| p.name.as_str())
    }
}
