//! Elimination vote against a dynamic quorum.
//!
//! A session holds at most one open vote. Quorum is the live roster size at
//! the moment of the check: the vote resolves once every present player has
//! a ballot on record. Departing players take their ballot with them via
//! [`VoteCoordinator::prune`], so a departure can complete a quorum.
//!
//! Ballots are keyed by voter id and record the chosen display name.
//! Resolution tallies ballots per name, so a player who reconnects mid-vote
//! keeps every ballot cast for them. Several names sharing the highest count
//! is a tie and eliminates nobody; a single maximum is the winner.

use std::{collections::BTreeMap, ops::Sub, time::Duration};

use trailhead_proto::payloads::broadcast::{Ballot, TallyEntry, VoteSnapshot};

use crate::{error::SessionError, player::PlayerId, roster::Roster};

/// What happens to a vote that stays open too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteDeadline {
    /// Votes stay open until quorum
    #[default]
    Disabled,
    /// Discard the vote after the duration
    Cancel(Duration),
    /// Resolve from the ballots cast so far after the duration; players
    /// without a ballot abstain
    ResolveWithAbstentions(Duration),
}

/// Action due when a deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineAction {
    /// Discard without result
    Cancel,
    /// Resolve from current ballots
    Resolve,
}

/// How a resolved vote ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Several candidates share the highest count
    Tie {
        /// Tied candidate names, tally order
        candidates: Vec<String>,
    },
    /// A single candidate has the highest count
    Winner {
        /// Winner display name as recorded on the ballots
        name: String,
    },
    /// No ballots to count
    Cancelled,
}

/// An open vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote<I> {
    target: String,
    ballots: BTreeMap<PlayerId, String>,
    opened_at: I,
}

impl<I: Copy> Vote<I> {
    /// Advisory target named when the vote opened.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of distinct voters with a ballot.
    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    /// Ids of every voter with a ballot.
    pub fn voters(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.ballots.keys().copied()
    }

    /// Per-candidate counts, highest first, ties by name.
    pub fn tally(&self) -> Vec<TallyEntry> {
        let mut tally: Vec<TallyEntry> = self
            .counts()
            .into_iter()
            .map(|(name, votes)| TallyEntry { name: name.to_string(), votes })
            .collect();
        tally.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));
        tally
    }

    fn counts(&self) -> BTreeMap<&str, u32> {
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for choice in self.ballots.values() {
            *counts.entry(choice.as_str()).or_insert(0) += 1;
        }
        counts
    }

    fn winner(&self) -> Resolution {
        let counts = self.counts();
        let Some(max) = counts.values().copied().max() else {
            return Resolution::Cancelled;
        };

        // BTreeMap iteration keeps the candidates sorted by name
        let leaders: Vec<&str> =
            counts.iter().filter(|(_, votes)| **votes == max).map(|(name, _)| *name).collect();

        match leaders.as_slice() {
            [name] => Resolution::Winner { name: (*name).to_string() },
            _ => Resolution::Tie {
                candidates: leaders.iter().map(|name| (*name).to_string()).collect(),
            },
        }
    }
}

/// Owns the open vote of one session.
#[derive(Debug, Clone)]
pub struct VoteCoordinator<I> {
    active: Option<Vote<I>>,
    deadline: VoteDeadline,
}

impl<I> VoteCoordinator<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Idle coordinator with the given deadline policy.
    pub fn new(deadline: VoteDeadline) -> Self {
        Self { active: None, deadline }
    }

    /// Whether a vote is open.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The open vote, if any.
    pub fn active(&self) -> Option<&Vote<I>> {
        self.active.as_ref()
    }

    /// Open a vote with an empty ballot map.
    ///
    /// # Errors
    ///
    /// - `SessionError::VoteAlreadyActive` if a vote is open
    pub fn open(&mut self, target: String, now: I) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::VoteAlreadyActive);
        }
        self.active = Some(Vote { target, ballots: BTreeMap::new(), opened_at: now });
        Ok(())
    }

    /// Record or overwrite `voter`'s ballot for the player named `choice`.
    ///
    /// # Errors
    ///
    /// - `SessionError::VoteNotActive` if no vote is open
    pub fn cast(&mut self, voter: PlayerId, choice: String) -> Result<(), SessionError> {
        let vote = self.active.as_mut().ok_or(SessionError::VoteNotActive)?;
        vote.ballots.insert(voter, choice);
        Ok(())
    }

    /// Drop ballots whose voter is no longer in the roster. Returns how many
    /// were dropped.
    pub fn prune(&mut self, roster: &Roster) -> usize {
        let Some(vote) = self.active.as_mut() else {
            return 0;
        };
        let before = vote.ballots.len();
        vote.ballots.retain(|voter, _| roster.contains(*voter));
        before - vote.ballots.len()
    }

    /// True when every present player has a ballot. Assumes [`Self::prune`]
    /// ran after the last roster change.
    pub fn has_quorum(&self, roster: &Roster) -> bool {
        self.active.as_ref().is_some_and(|vote| vote.ballots.len() == roster.len())
    }

    /// Client view of the open vote.
    pub fn snapshot(&self, roster: &Roster) -> Option<VoteSnapshot> {
        let vote = self.active.as_ref()?;

        let ballots = roster
            .players()
            .iter()
            .filter_map(|p| {
                vote.ballots
                    .get(&p.id)
                    .map(|choice| Ballot { voter: p.name.clone(), choice: choice.clone() })
            })
            .collect();

        let outstanding = roster.len().saturating_sub(vote.ballots.len());

        Some(VoteSnapshot {
            target: vote.target.clone(),
            ballots,
            tally: vote.tally(),
            outstanding: u32::try_from(outstanding).unwrap_or(u32::MAX),
        })
    }

    /// Close the open vote and compute its result.
    pub fn resolve(&mut self) -> Option<Resolution> {
        self.active.take().map(|vote| vote.winner())
    }

    /// Discard the open vote. Returns false if none was open.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some()
    }

    /// Deadline action due at `now`, if any.
    pub fn deadline_due(&self, now: I) -> Option<DeadlineAction> {
        let vote = self.active.as_ref()?;
        let elapsed = now - vote.opened_at;

        match self.deadline {
            VoteDeadline::Disabled => None,
            VoteDeadline::Cancel(limit) => (elapsed >= limit).then_some(DeadlineAction::Cancel),
            VoteDeadline::ResolveWithAbstentions(limit) => {
                (elapsed >= limit).then_some(DeadlineAction::Resolve)
            },
        }
    }
}
