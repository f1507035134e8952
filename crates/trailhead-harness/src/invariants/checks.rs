//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold
//! between two events. They verify WHAT must be true, not specific test
//! scenarios.

use std::collections::{BTreeSet, HashSet};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// The turn pointer stays inside the roster.
///
/// With players present the index is in `[0, len)`; with an empty roster it
/// is 0.
pub struct TurnPointerInRange;

impl Invariant for TurnPointerInRange {
    fn name(&self) -> &'static str {
        "TurnPointerInRange"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let len = session.players.len();
            let in_range =
                if len == 0 { session.turn_index == 0 } else { session.turn_index < len };
            if !in_range {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: turn index {} with {} players",
                        session.key, session.turn_index, len
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Display names are unique within a session.
pub struct UniqueNames;

impl Invariant for UniqueNames {
    fn name(&self) -> &'static str {
        "UniqueNames"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let mut seen = HashSet::new();
            for player in &session.players {
                if !seen.insert(player.name.as_str()) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {}: name {:?} appears twice in {:?}",
                            session.key,
                            player.name,
                            session.names()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A connection is bound to at most one entry per session, and every bound
/// connection receives the session's broadcasts.
pub struct UniqueConnections;

impl Invariant for UniqueConnections {
    fn name(&self) -> &'static str {
        "UniqueConnections"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let mut seen = HashSet::new();
            for player in &session.players {
                if !seen.insert(player.connection_id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {}: connection {:#x} holds more than one entry",
                            session.key, player.connection_id
                        ),
                    });
                }
                if !session.subscribers.contains(&player.connection_id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "session {}: {} bound to unsubscribed connection {:#x}",
                            session.key, player.name, player.connection_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Only present players hold ballots in an open vote.
pub struct BallotsFromMembers;

impl Invariant for BallotsFromMembers {
    fn name(&self) -> &'static str {
        "BallotsFromMembers"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let present: BTreeSet<u64> = session.players.iter().map(|p| p.id).collect();
            let stale: Vec<_> = session.voters.difference(&present).collect();
            if !stale.is_empty() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: ballots from departed players {:?}",
                        session.key, stale
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A vote that has every present player's ballot has been resolved.
///
/// An open vote therefore has a non-empty roster and at least one
/// outstanding ballot.
pub struct OpenVoteBelowQuorum;

impl Invariant for OpenVoteBelowQuorum {
    fn name(&self) -> &'static str {
        "OpenVoteBelowQuorum"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let Some(target) = &session.vote_target else {
                continue;
            };
            if session.voters.len() >= session.players.len() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session {}: vote on {} still open with {} ballots and {} players",
                        session.key,
                        target,
                        session.voters.len(),
                        session.players.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Sessions without players are evicted.
pub struct NoEmptySessions;

impl Invariant for NoEmptySessions {
    fn name(&self) -> &'static str {
        "NoEmptySessions"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        match state.sessions.iter().find(|s| s.players.is_empty()) {
            Some(session) => Err(Violation {
                invariant: self.name(),
                message: format!("session {} is registered with no players", session.key),
            }),
            None => Ok(()),
        }
    }
}
