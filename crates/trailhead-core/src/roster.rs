//! Ordered set of players present in a session.
//!
//! Order is join order and doubles as turn order. Display names are unique
//! and each connection binds at most one entry.

use trailhead_proto::payloads::lobby::PlayerProfile;

use crate::player::{ConnectionId, Player, PlayerId};

/// What a join did to the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Id of the entry now bound to the joining connection
    pub player_id: PlayerId,
    /// True if an existing entry with the same name was taken over
    pub rejoined: bool,
    /// Entries dropped because the joining connection held them under
    /// another name
    pub displaced: Vec<PlayerId>,
}

/// Session roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is present.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players in turn order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Player at a turn index.
    pub fn get(&self, index: usize) -> Option<&Player> {
        self.players.get(index)
    }

    /// Position of the named player.
    pub fn position_of_name(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    /// Look up by display name.
    pub fn by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    /// Look up by id.
    pub fn by_id(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Entry bound to a connection.
    pub fn by_connection(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection_id == connection_id)
    }

    /// Whether the id belongs to a present player.
    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    /// Insert or take over an entry for `profile.name`.
    ///
    /// Entries held by the joining connection under a different name are
    /// dropped first. An existing entry with the same name keeps its id and
    /// position and is rebound to the joining connection; otherwise a new
    /// entry is appended with the id produced by `new_id`.
    ///
    /// Callers decide whether a takeover is allowed; see
    /// [`Roster::takeover_allowed`].
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        caller_context: Option<&[u8]>,
        profile: PlayerProfile,
        new_id: impl FnOnce() -> PlayerId,
    ) -> JoinOutcome {
        let mut displaced = Vec::new();
        self.players.retain(|p| {
            let stale = p.connection_id == connection_id && p.name != profile.name;
            if stale {
                displaced.push(p.id);
            }
            !stale
        });

        if let Some(existing) = self.players.iter_mut().find(|p| p.name == profile.name) {
            existing.connection_id = connection_id;
            existing.caller_context = caller_context.map(<[u8]>::to_vec);
            existing.avatar = profile.avatar;
            existing.stats = profile.stats;
            return JoinOutcome { player_id: existing.id, rejoined: true, displaced };
        }

        let player_id = new_id();
        self.players.push(Player::from_profile(player_id, connection_id, caller_context, profile));
        JoinOutcome { player_id, rejoined: false, displaced }
    }

    /// Remove the entry bound to a connection.
    pub fn remove_connection(&mut self, connection_id: ConnectionId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.connection_id == connection_id)?;
        Some(self.players.remove(index))
    }

    /// Whether `connection_id` presenting `caller_context` may bind the
    /// entry named `name`. A free name, the connection already bound to it,
    /// or the same verified caller on a new connection may; anyone else may
    /// not.
    pub fn takeover_allowed(
        &self,
        name: &str,
        connection_id: ConnectionId,
        caller_context: Option<&[u8]>,
    ) -> bool {
        self.by_name(name).is_none_or(|existing| {
            existing.connection_id == connection_id
                || existing.caller_context.as_deref() == caller_context
        })
    }

    /// Remove a player by display name.
    pub fn remove_name(&mut self, name: &str) -> Option<Player> {
        let index = self.position_of_name(name)?;
        Some(self.players.remove(index))
    }

    /// Overwrite the stats of the named player. Returns false if absent.
    pub fn set_stats(&mut self, name: &str, stats: bytes::Bytes) -> bool {
        match self.players.iter_mut().find(|p| p.name == name) {
            Some(player) => {
                player.stats = stats;
                true
            },
            None => false,
        }
    }
}
