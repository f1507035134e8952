//! Player identity and roster entries.

use std::fmt;

use bytes::Bytes;
use trailhead_proto::payloads::{broadcast::PlayerInfo, lobby::PlayerProfile};

/// Per-connection identifier. Changes on every reconnect.
pub type ConnectionId = u64;

/// Server-generated player identifier.
///
/// Assigned on a player's first join to a session and kept when the same
/// display name rejoins, so ballots survive reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(u64);

impl PlayerId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Stable id
    pub id: PlayerId,
    /// Display name, unique within the session
    pub name: String,
    /// Connection currently bound to this entry
    pub connection_id: ConnectionId,
    /// Verified caller context of the bound connection, from its Hello
    pub caller_context: Option<Vec<u8>>,
    /// Avatar or other display metadata
    pub avatar: Option<String>,
    /// Opaque gameplay stats, relayed verbatim
    pub stats: Bytes,
}

impl Player {
    /// Build a new entry from a declared profile.
    pub fn from_profile(
        id: PlayerId,
        connection_id: ConnectionId,
        caller_context: Option<&[u8]>,
        profile: PlayerProfile,
    ) -> Self {
        Self {
            id,
            name: profile.name,
            connection_id,
            caller_context: caller_context.map(<[u8]>::to_vec),
            avatar: profile.avatar,
            stats: profile.stats,
        }
    }

    /// Client view of this entry.
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.get(),
            name: self.name.clone(),
            connection_id: self.connection_id,
            avatar: self.avatar.clone(),
            stats: self.stats.clone(),
        }
    }
}
