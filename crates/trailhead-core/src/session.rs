//! Session aggregate: roster, turn pointer and at most one open vote.
//!
//! Every operation either applies completely and returns the events to
//! broadcast, or is rejected with a [`SessionError`] and leaves the session
//! untouched. Events carry payloads built at the moment of emission, so a
//! later mutation never leaks into an earlier broadcast.
//!
//! Roster mutations always run the same follow-up: renormalize the turn
//! pointer, drop ballots of departed voters, and re-check the vote quorum.

use std::{ops::Sub, time::Duration};

use trailhead_proto::{
    Payload,
    payloads::{
        broadcast::{
            ActionUpdate, GameStarted, PlayerEliminated, SessionState, TurnUpdate, VoteOutcome,
            VoteResult, VoteTie, VoteUpdate,
        },
        lobby::{ChatMessage, GameAction, PlayerProfile},
    },
};

use crate::{
    env::Environment,
    error::SessionError,
    player::{ConnectionId, Player, PlayerId},
    roster::Roster,
    turn::{TurnPhase, TurnScheduler},
    vote::{DeadlineAction, Resolution, VoteCoordinator, VoteDeadline},
};

/// Per-session configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Policy for votes that never reach quorum
    pub vote_deadline: VoteDeadline,
}

/// Output of a session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Deliver to every subscriber of the session
    Broadcast(Payload),

    /// The operation applied, but hit an inconsistency worth logging
    Anomaly(SessionError),
}

/// One game lobby.
#[derive(Debug, Clone)]
pub struct Session<I> {
    key: String,
    roster: Roster,
    turns: TurnScheduler,
    votes: VoteCoordinator<I>,
}

impl<I> Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Empty session.
    pub fn new(key: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            key: key.into(),
            roster: Roster::new(),
            turns: TurnScheduler::new(),
            votes: VoteCoordinator::new(config.vote_deadline),
        }
    }

    /// Session key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Players in turn order.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Turn pointer.
    pub fn turns(&self) -> &TurnScheduler {
        &self.turns
    }

    /// Vote coordinator.
    pub fn votes(&self) -> &VoteCoordinator<I> {
        &self.votes
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Whether `connection_id` is bound to a roster entry.
    pub fn has_connection(&self, connection_id: ConnectionId) -> bool {
        self.roster.by_connection(connection_id).is_some()
    }

    /// Full client-visible state.
    pub fn state(&self) -> SessionState {
        let current_player = self
            .turns
            .current(self.roster.len())
            .and_then(|index| self.roster.get(index))
            .map(|p| p.name.clone());

        SessionState {
            session_key: self.key.clone(),
            players: self.roster.players().iter().map(Player::info).collect(),
            turn_index: u32::try_from(self.turns.index()).unwrap_or(u32::MAX),
            current_player,
            vote: self.votes.snapshot(&self.roster),
        }
    }

    /// Join or rejoin under `profile.name`.
    ///
    /// `caller_context` is the verified context the connection presented in
    /// its handshake. Taking over a name bound to another connection requires
    /// the same context.
    ///
    /// # Errors
    ///
    /// - `SessionError::IdentityMismatch` if the name is held by a different
    ///   caller
    pub fn join<E>(
        &mut self,
        env: &E,
        connection_id: ConnectionId,
        caller_context: Option<&[u8]>,
        profile: PlayerProfile,
    ) -> Result<Vec<SessionEvent>, SessionError>
    where
        E: Environment<Instant = I>,
    {
        if !self.roster.takeover_allowed(&profile.name, connection_id, caller_context) {
            return Err(SessionError::IdentityMismatch { claimed: profile.name, connection_id });
        }

        let fresh = self.fresh_player_id(env);
        self.roster.join(connection_id, caller_context, profile, || fresh);

        let mut events = self.after_roster_change();
        events.push(self.state_event());
        Ok(events)
    }

    /// Remove the player bound to `connection_id`.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAMember` if the connection has no roster entry
    pub fn leave(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.roster.remove_connection(connection_id).is_none() {
            return Err(SessionError::NotAMember { connection_id });
        }

        let mut events = self.after_roster_change();
        events.push(self.state_event());
        Ok(events)
    }

    /// Transport-level disconnect. Same as [`Session::leave`] but silent when
    /// the connection holds no entry.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Vec<SessionEvent> {
        self.leave(connection_id).unwrap_or_default()
    }

    /// Start the game at a uniformly random turn owner.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidRosterState` if the roster is empty
    /// - `SessionError::NotAMember` if the caller has no roster entry
    pub fn start_game<E>(
        &mut self,
        env: &E,
        connection_id: ConnectionId,
    ) -> Result<Vec<SessionEvent>, SessionError>
    where
        E: Environment<Instant = I>,
    {
        if self.roster.is_empty() {
            return Err(SessionError::InvalidRosterState {
                reason: "cannot start a game without players".to_string(),
            });
        }
        self.member(connection_id)?;

        let len = self.roster.len();
        let start = usize::try_from(env.random_below(len as u64)).unwrap_or(0);
        self.turns.start(start, len);

        let started = GameStarted { state: self.state() };
        let mut events = vec![SessionEvent::Broadcast(Payload::GameStarted(started))];
        events.extend(self.turn_event());
        Ok(events)
    }

    /// Pass the turn to the next player in roster order. Starts the game at
    /// the next index if it was not running.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAMember` if the caller has no roster entry
    /// - `SessionError::NotTurnOwner` if a game is running and the caller
    ///   does not own the turn
    pub fn end_turn(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        self.turn_actor(connection_id)?;

        if self.turns.advance(self.roster.len()).is_none() {
            return Err(SessionError::InvalidRosterState {
                reason: "cannot advance the turn without players".to_string(),
            });
        }

        let mut events: Vec<SessionEvent> = self.turn_event().into_iter().collect();
        events.push(self.state_event());
        Ok(events)
    }

    /// Hand the turn to a named player. Starts the game if it was not
    /// running.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAMember` / `SessionError::NotTurnOwner` as for
    ///   [`Session::end_turn`]
    /// - `SessionError::UnknownPlayer` if `name` is not in the roster
    pub fn next_turn(
        &mut self,
        connection_id: ConnectionId,
        name: &str,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        self.turn_actor(connection_id)?;

        let index = self
            .roster
            .position_of_name(name)
            .ok_or_else(|| SessionError::UnknownPlayer { name: name.to_string() })?;
        self.turns.set(index, self.roster.len());

        Ok(self.turn_event().into_iter().collect())
    }

    /// Relay a gameplay action, writing the supplied stats verbatim.
    ///
    /// Stats naming players not in the roster are skipped.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAMember` if the caller has no roster entry
    pub fn apply_action(
        &mut self,
        connection_id: ConnectionId,
        action: GameAction,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let actor = self.member(connection_id)?.name.clone();

        for update in &action.stats_updates {
            self.roster.set_stats(&update.name, update.stats.clone());
        }

        Ok(vec![SessionEvent::Broadcast(Payload::ActionUpdate(ActionUpdate {
            session_key: self.key.clone(),
            actor,
            kind: action.kind,
            stats_updates: action.stats_updates,
        }))])
    }

    /// Relay a chat message unchanged.
    pub fn chat(&self, message: ChatMessage) -> Vec<SessionEvent> {
        vec![SessionEvent::Broadcast(Payload::Chat(message))]
    }

    /// Open an elimination vote.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotAMember` if the caller has no roster entry
    /// - `SessionError::UnknownPlayer` if `target` is not in the roster
    /// - `SessionError::VoteAlreadyActive` if a vote is open
    pub fn start_vote(
        &mut self,
        connection_id: ConnectionId,
        target: &str,
        now: I,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        self.member(connection_id)?;
        if self.roster.by_name(target).is_none() {
            return Err(SessionError::UnknownPlayer { name: target.to_string() });
        }

        self.votes.open(target.to_string(), now)?;

        let mut events = Vec::new();
        if let Some(vote) = self.votes.snapshot(&self.roster) {
            events.push(SessionEvent::Broadcast(Payload::VoteStarted(VoteUpdate {
                session_key: self.key.clone(),
                vote,
            })));
        }
        events.push(self.state_event());
        Ok(events)
    }

    /// Record `voter`'s ballot for `choice` and resolve on quorum.
    ///
    /// # Errors
    ///
    /// - `SessionError::VoteNotActive` if no vote is open
    /// - `SessionError::VoterNotInRoster` if `voter` is not in the roster
    /// - `SessionError::IdentityMismatch` if `voter` is bound to another
    ///   connection
    /// - `SessionError::UnknownPlayer` if `choice` is not in the roster
    pub fn cast_vote(
        &mut self,
        connection_id: ConnectionId,
        voter: &str,
        choice: &str,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if !self.votes.is_active() {
            return Err(SessionError::VoteNotActive);
        }

        let voter_entry = self
            .roster
            .by_name(voter)
            .ok_or_else(|| SessionError::VoterNotInRoster { name: voter.to_string() })?;
        if voter_entry.connection_id != connection_id {
            return Err(SessionError::IdentityMismatch {
                claimed: voter.to_string(),
                connection_id,
            });
        }
        let voter_id = voter_entry.id;

        let choice_entry = self
            .roster
            .by_name(choice)
            .ok_or_else(|| SessionError::UnknownPlayer { name: choice.to_string() })?;
        let choice_name = choice_entry.name.clone();

        self.votes.cast(voter_id, choice_name)?;

        let mut events = Vec::new();
        if let Some(vote) = self.votes.snapshot(&self.roster) {
            events.push(SessionEvent::Broadcast(Payload::VoteUpdate(VoteUpdate {
                session_key: self.key.clone(),
                vote,
            })));
        }
        events.extend(self.check_quorum());
        Ok(events)
    }

    /// Apply the vote deadline policy at `now`.
    pub fn tick(&mut self, now: I) -> Vec<SessionEvent> {
        match self.votes.deadline_due(now) {
            None => Vec::new(),
            Some(DeadlineAction::Cancel) => {
                self.votes.cancel();
                self.finish_vote(Resolution::Cancelled)
            },
            Some(DeadlineAction::Resolve) => self.resolve_vote(),
        }
    }

    fn member(&self, connection_id: ConnectionId) -> Result<&Player, SessionError> {
        self.roster.by_connection(connection_id).ok_or(SessionError::NotAMember { connection_id })
    }

    fn turn_actor(&self, connection_id: ConnectionId) -> Result<(), SessionError> {
        self.member(connection_id)?;

        if self.turns.phase() == TurnPhase::InProgress {
            let owner = self.turns.current(self.roster.len()).and_then(|i| self.roster.get(i));
            if owner.map(|p| p.connection_id) != Some(connection_id) {
                return Err(SessionError::NotTurnOwner { connection_id });
            }
        }
        Ok(())
    }

    fn fresh_player_id<E: Environment>(&self, env: &E) -> PlayerId {
        loop {
            let id = PlayerId::new(env.random_u64());
            if id.get() != 0 && !self.roster.contains(id) {
                return id;
            }
        }
    }

    fn after_roster_change(&mut self) -> Vec<SessionEvent> {
        self.turns.renormalize(self.roster.len());
        self.votes.prune(&self.roster);

        if self.votes.is_active() && self.roster.is_empty() {
            self.votes.cancel();
            return self.finish_vote(Resolution::Cancelled);
        }

        self.check_quorum()
    }

    fn check_quorum(&mut self) -> Vec<SessionEvent> {
        if !self.votes.has_quorum(&self.roster) {
            return Vec::new();
        }
        self.resolve_vote()
    }

    fn resolve_vote(&mut self) -> Vec<SessionEvent> {
        let final_vote = self.votes.snapshot(&self.roster);
        let Some(resolution) = self.votes.resolve() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if let (Resolution::Tie { candidates }, Some(vote)) = (&resolution, final_vote) {
            events.push(SessionEvent::Broadcast(Payload::VoteTie(VoteTie {
                session_key: self.key.clone(),
                candidates: candidates.clone(),
                vote,
            })));
        }
        events.extend(self.finish_vote(resolution));
        events
    }

    /// Apply a resolution whose vote was already taken out of the
    /// coordinator.
    fn finish_vote(&mut self, resolution: Resolution) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        let outcome = match resolution {
            Resolution::Tie { .. } => VoteOutcome::Tie,
            Resolution::Cancelled => VoteOutcome::Cancelled,
            Resolution::Winner { name } => match self.roster.remove_name(&name) {
                Some(_) => {
                    events.push(SessionEvent::Broadcast(Payload::PlayerEliminated(
                        PlayerEliminated { session_key: self.key.clone(), name: name.clone() },
                    )));
                    self.turns.renormalize(self.roster.len());
                    VoteOutcome::Eliminated { name }
                },
                None => {
                    events.push(SessionEvent::Anomaly(SessionError::InvalidRosterState {
                        reason: format!("vote winner {name} already left the session"),
                    }));
                    VoteOutcome::Void { name }
                },
            },
        };

        events.push(SessionEvent::Broadcast(Payload::VoteResult(VoteResult {
            session_key: self.key.clone(),
            outcome,
        })));
        events.push(self.state_event());
        events.extend(self.turn_event());
        events
    }

    fn state_event(&self) -> SessionEvent {
        SessionEvent::Broadcast(Payload::SessionState(self.state()))
    }

    /// Turn owner announcement. `None` while no game is running, matching
    /// `SessionState::current_player`.
    fn turn_event(&self) -> Option<SessionEvent> {
        let index = self.turns.current(self.roster.len())?;
        let player = self.roster.get(index)?;
        Some(SessionEvent::Broadcast(Payload::TurnUpdate(TurnUpdate {
            session_key: self.key.clone(),
            current_player: player.name.clone(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Instant,
    };

    use bytes::Bytes;
    use trailhead_proto::payloads::lobby::{ActionKind, StatsUpdate};

    use super::*;

    #[derive(Clone, Default)]
    struct TestEnv {
        counter: Arc<AtomicU64>,
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let value = (self.counter.fetch_add(1, Ordering::Relaxed) + 1).to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = value[i % value.len()];
            }
        }
    }

    fn profile(name: &str) -> PlayerProfile {
        PlayerProfile { name: name.to_string(), avatar: None, stats: Bytes::new() }
    }

    /// Session with players `names`, bound to connections 1, 2, 3, ...
    fn session(env: &TestEnv, names: &[&str]) -> Session<Instant> {
        let mut session = Session::new("L1", SessionConfig::default());
        for (i, name) in names.iter().enumerate() {
            session.join(env, i as u64 + 1, None, profile(name)).unwrap();
        }
        session
    }

    fn payloads(events: &[SessionEvent]) -> Vec<&Payload> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Broadcast(p) => Some(p),
                SessionEvent::Anomaly(_) => None,
            })
            .collect()
    }

    fn names(session: &Session<Instant>) -> Vec<&str> {
        session.roster().players().iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn join_broadcasts_state() {
        let env = TestEnv::default();
        let mut session = Session::new("L1", SessionConfig::default());

        let events = session.join(&env, 1, None, profile("A")).unwrap();
        assert!(matches!(payloads(&events)[..], [Payload::SessionState(_)]));
        assert_eq!(session.roster().len(), 1);
    }

    #[test]
    fn rejoin_keeps_single_entry() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A"]);

        session.disconnect(1);
        assert!(session.is_empty());

        session.join(&env, 7, None, profile("A")).unwrap();
        assert_eq!(session.roster().len(), 1);
        assert_eq!(session.roster().by_connection(7).map(|p| p.name.as_str()), Some("A"));
    }

    #[test]
    fn reconnect_while_present_keeps_player_id() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B"]);
        let before = session.roster().by_name("A").map(|p| p.id);

        session.join(&env, 9, None, profile("A")).unwrap();

        assert_eq!(session.roster().len(), 2);
        assert_eq!(session.roster().by_name("A").map(|p| p.id), before);
        assert!(!session.has_connection(1));
    }

    #[test]
    fn start_game_on_empty_roster_is_rejected() {
        let env = TestEnv::default();
        let mut session: Session<Instant> = Session::new("L1", SessionConfig::default());

        let result = session.start_game(&env, 1);
        assert!(matches!(result, Err(SessionError::InvalidRosterState { .. })));
        assert_eq!(session.turns().phase(), TurnPhase::NotStarted);
    }

    #[test]
    fn start_game_emits_started_then_turn() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);

        let events = session.start_game(&env, 2).unwrap();
        let owner = session.state().current_player.unwrap();

        match payloads(&events)[..] {
            [Payload::GameStarted(started), Payload::TurnUpdate(turn)] => {
                assert_eq!(started.state.current_player.as_deref(), Some(owner.as_str()));
                assert_eq!(turn.current_player, owner);
            },
            ref other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn only_turn_owner_may_end_turn() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);
        session.start_game(&env, 1).unwrap();

        let owner_conn = session.roster().get(session.turns().index()).unwrap().connection_id;
        let other_conn = (1..=3).find(|c| *c != owner_conn).unwrap();

        assert_eq!(
            session.end_turn(other_conn),
            Err(SessionError::NotTurnOwner { connection_id: other_conn })
        );

        let before = session.turns().index();
        let events = session.end_turn(owner_conn).unwrap();
        assert_eq!(session.turns().index(), (before + 1) % 3);
        assert!(matches!(payloads(&events)[..], [
            Payload::TurnUpdate(_),
            Payload::SessionState(_)
        ]));
    }

    #[test]
    fn next_turn_to_named_player() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);

        let events = session.next_turn(1, "C").unwrap();
        assert_eq!(session.turns().index(), 2);
        assert_eq!(session.turns().phase(), TurnPhase::InProgress);
        match payloads(&events)[..] {
            [Payload::TurnUpdate(turn)] => assert_eq!(turn.current_player, "C"),
            ref other => panic!("unexpected events {other:?}"),
        }

        assert_eq!(
            session.next_turn(1, "A"),
            Err(SessionError::NotTurnOwner { connection_id: 1 })
        );
        assert_eq!(
            session.next_turn(3, "Z"),
            Err(SessionError::UnknownPlayer { name: "Z".to_string() })
        );
    }

    #[test]
    fn end_turn_before_start_agrees_with_state() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);

        let events = session.end_turn(3).unwrap();

        match payloads(&events)[..] {
            [Payload::TurnUpdate(turn), Payload::SessionState(state)] => {
                assert_eq!(turn.current_player, "B");
                assert_eq!(state.current_player.as_deref(), Some("B"));
                assert_eq!(state.turn_index, 1);
            },
            ref other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn elimination_before_start_announces_no_owner() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B"]);
        session.start_vote(1, "B", Instant::now()).unwrap();

        session.cast_vote(1, "A", "B").unwrap();
        let events = session.cast_vote(2, "B", "B").unwrap();

        assert_eq!(names(&session), vec!["A"]);
        assert!(!payloads(&events).iter().any(|p| matches!(p, Payload::TurnUpdate(_))));
        assert_eq!(session.state().current_player, None);
    }

    #[test]
    fn action_writes_stats_verbatim() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B"]);

        let action = GameAction {
            session_key: "L1".to_string(),
            kind: ActionKind::Walk { move_amount: 3 },
            stats_updates: vec![
                StatsUpdate { name: "B".to_string(), stats: Bytes::from_static(b"hp=2") },
                StatsUpdate { name: "ghost".to_string(), stats: Bytes::from_static(b"x") },
            ],
        };
        let events = session.apply_action(1, action).unwrap();

        assert_eq!(
            session.roster().by_name("B").map(|p| p.stats.clone()),
            Some(Bytes::from_static(b"hp=2"))
        );
        match payloads(&events)[..] {
            [Payload::ActionUpdate(update)] => assert_eq!(update.actor, "A"),
            ref other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(session.turns().phase(), TurnPhase::NotStarted);
    }

    #[test]
    fn majority_vote_eliminates_and_renormalizes() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);
        session.next_turn(1, "C").unwrap();
        session.start_vote(1, "C", Instant::now()).unwrap();

        session.cast_vote(1, "A", "C").unwrap();
        session.cast_vote(2, "B", "C").unwrap();
        let events = session.cast_vote(3, "C", "A").unwrap();

        assert_eq!(names(&session), vec!["A", "B"]);
        assert!(!session.votes().is_active());
        assert!(session.turns().index() < 2);

        match payloads(&events)[..] {
            [
                Payload::VoteUpdate(_),
                Payload::PlayerEliminated(eliminated),
                Payload::VoteResult(result),
                Payload::SessionState(_),
                Payload::TurnUpdate(_),
            ] => {
                assert_eq!(eliminated.name, "C");
                assert_eq!(result.outcome, VoteOutcome::Eliminated { name: "C".to_string() });
            },
            ref other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn rejoined_candidate_keeps_ballots_cast_for_them() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);
        session.start_vote(1, "C", Instant::now()).unwrap();
        session.cast_vote(1, "A", "C").unwrap();

        session.disconnect(3);
        session.join(&env, 4, None, profile("C")).unwrap();
        session.cast_vote(2, "B", "C").unwrap();
        let events = session.cast_vote(4, "C", "A").unwrap();

        assert_eq!(names(&session), vec!["A", "B"]);
        assert!(payloads(&events).iter().any(|p| matches!(
            p,
            Payload::VoteResult(VoteResult { outcome: VoteOutcome::Eliminated { name }, .. })
                if name == "C"
        )));
    }

    #[test]
    fn tie_lists_each_candidate_once() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C", "D"]);
        session.start_vote(1, "C", Instant::now()).unwrap();
        session.cast_vote(1, "A", "C").unwrap();

        session.disconnect(3);
        session.join(&env, 5, None, profile("C")).unwrap();
        session.cast_vote(2, "B", "C").unwrap();
        session.cast_vote(5, "C", "A").unwrap();
        let events = session.cast_vote(4, "D", "A").unwrap();

        match payloads(&events)[..] {
            [Payload::VoteUpdate(_), Payload::VoteTie(tie), ..] => {
                assert_eq!(tie.candidates, vec!["A".to_string(), "C".to_string()]);
            },
            ref other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(names(&session), vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn takeover_by_another_caller_is_rejected() {
        let env = TestEnv::default();
        let mut session = Session::new("L1", SessionConfig::default());
        session.join(&env, 1, Some(b"alice".as_slice()), profile("A")).unwrap();
        session.join(&env, 2, Some(b"bob".as_slice()), profile("B")).unwrap();
        session.start_vote(1, "B", Instant::now()).unwrap();
        session.cast_vote(1, "A", "B").unwrap();

        assert_eq!(
            session.join(&env, 3, Some(b"mallory".as_slice()), profile("A")),
            Err(SessionError::IdentityMismatch { claimed: "A".to_string(), connection_id: 3 })
        );
        assert_eq!(session.roster().by_name("A").map(|p| p.connection_id), Some(1));

        // Same caller on a fresh connection keeps the entry and its ballot
        session.join(&env, 4, Some(b"alice".as_slice()), profile("A")).unwrap();
        assert_eq!(session.roster().by_name("A").map(|p| p.connection_id), Some(4));
        assert_eq!(session.votes().active().map(|v| v.ballot_count()), Some(1));
    }

    #[test]
    fn split_vote_is_tie() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B"]);
        session.start_vote(1, "B", Instant::now()).unwrap();

        session.cast_vote(1, "A", "B").unwrap();
        let events = session.cast_vote(2, "B", "A").unwrap();

        assert_eq!(names(&session), vec!["A", "B"]);
        assert!(!session.votes().is_active());
        match payloads(&events)[..] {
            [Payload::VoteUpdate(_), Payload::VoteTie(tie), Payload::VoteResult(result), ..] => {
                assert_eq!(tie.candidates, vec!["A".to_string(), "B".to_string()]);
                assert_eq!(result.outcome, VoteOutcome::Tie);
            },
            ref other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn departure_shrinks_quorum() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);
        session.start_vote(2, "B", Instant::now()).unwrap();

        session.disconnect(1);
        session.cast_vote(2, "B", "C").unwrap();
        assert!(session.votes().is_active());

        session.cast_vote(3, "C", "C").unwrap();
        assert!(!session.votes().is_active());
        assert_eq!(names(&session), vec!["B"]);
    }

    #[test]
    fn departure_can_complete_quorum() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);
        session.start_vote(1, "C", Instant::now()).unwrap();
        session.cast_vote(1, "A", "C").unwrap();
        session.cast_vote(2, "B", "C").unwrap();

        let events = session.leave(3).unwrap();

        assert!(!session.votes().is_active());
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Anomaly(SessionError::InvalidRosterState { .. })
        )));
        assert!(payloads(&events).iter().any(|p| matches!(
            p,
            Payload::VoteResult(VoteResult { outcome: VoteOutcome::Void { .. }, .. })
        )));
        assert_eq!(names(&session), vec!["A", "B"]);
    }

    #[test]
    fn relays_and_votes_require_membership() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B"]);

        let action = GameAction {
            session_key: "L1".to_string(),
            kind: ActionKind::Walk { move_amount: 1 },
            stats_updates: vec![StatsUpdate {
                name: "A".to_string(),
                stats: Bytes::from_static(b"hp=0"),
            }],
        };
        assert_eq!(
            session.apply_action(9, action),
            Err(SessionError::NotAMember { connection_id: 9 })
        );
        assert_eq!(session.roster().by_name("A").map(|p| p.stats.clone()), Some(Bytes::new()));

        assert_eq!(
            session.start_vote(1, "Z", Instant::now()),
            Err(SessionError::UnknownPlayer { name: "Z".to_string() })
        );
        assert!(!session.votes().is_active());
    }

    #[test]
    fn ballot_checks() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B"]);

        assert_eq!(session.cast_vote(1, "A", "B"), Err(SessionError::VoteNotActive));

        session.start_vote(1, "B", Instant::now()).unwrap();
        assert_eq!(
            session.start_vote(1, "B", Instant::now()),
            Err(SessionError::VoteAlreadyActive)
        );
        assert_eq!(
            session.cast_vote(1, "Z", "B"),
            Err(SessionError::VoterNotInRoster { name: "Z".to_string() })
        );
        assert_eq!(
            session.cast_vote(1, "B", "A"),
            Err(SessionError::IdentityMismatch { claimed: "B".to_string(), connection_id: 1 })
        );
        assert_eq!(
            session.cast_vote(1, "A", "Z"),
            Err(SessionError::UnknownPlayer { name: "Z".to_string() })
        );
        assert_eq!(session.votes().active().map(|v| v.ballot_count()), Some(0));
    }

    #[test]
    fn last_player_leaving_cancels_vote() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A"]);
        session.start_vote(1, "A", Instant::now()).unwrap();

        let events = session.leave(1).unwrap();

        assert!(session.is_empty());
        assert!(!session.votes().is_active());
        assert!(payloads(&events).iter().any(|p| matches!(
            p,
            Payload::VoteResult(VoteResult { outcome: VoteOutcome::Cancelled, .. })
        )));
    }

    #[test]
    fn deadline_resolves_with_abstentions() {
        let env = TestEnv::default();
        let config = SessionConfig {
            vote_deadline: VoteDeadline::ResolveWithAbstentions(Duration::from_secs(30)),
        };
        let mut session = Session::new("L1", config);
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            session.join(&env, i as u64 + 1, None, profile(name)).unwrap();
        }

        let t0 = Instant::now();
        session.start_vote(1, "C", t0).unwrap();
        session.cast_vote(1, "A", "C").unwrap();

        assert!(session.tick(t0 + Duration::from_secs(10)).is_empty());

        session.tick(t0 + Duration::from_secs(31));
        assert!(!session.votes().is_active());
        assert_eq!(names(&session), vec!["A", "B"]);
    }

    #[test]
    fn deadline_cancel_keeps_roster() {
        let env = TestEnv::default();
        let config = SessionConfig { vote_deadline: VoteDeadline::Cancel(Duration::from_secs(5)) };
        let mut session = Session::new("L1", config);
        session.join(&env, 1, None, profile("A")).unwrap();
        session.join(&env, 2, None, profile("B")).unwrap();

        let t0 = Instant::now();
        session.start_vote(1, "B", t0).unwrap();
        session.cast_vote(1, "A", "B").unwrap();

        let events = session.tick(t0 + Duration::from_secs(6));
        assert_eq!(names(&session), vec!["A", "B"]);
        assert!(payloads(&events).iter().any(|p| matches!(
            p,
            Payload::VoteResult(VoteResult { outcome: VoteOutcome::Cancelled, .. })
        )));
    }

    #[test]
    fn chat_is_relayed_verbatim() {
        let env = TestEnv::default();
        let session = session(&env, &["A"]);
        let message = ChatMessage {
            session_key: "L1".to_string(),
            author: "anyone".to_string(),
            body: "hello".to_string(),
        };

        let events = session.chat(message.clone());
        assert_eq!(events, vec![SessionEvent::Broadcast(Payload::Chat(message))]);
    }

    #[test]
    fn state_rendering() {
        let env = TestEnv::default();
        let mut session = session(&env, &["A", "B", "C"]);
        session.next_turn(1, "B").unwrap();
        session.start_vote(1, "C", Instant::now()).unwrap();
        session.cast_vote(1, "A", "C").unwrap();

        let state = session.state();
        let vote = state.vote.unwrap();
        let rendered = format!(
            "players={:?}\nturn={}\ntarget={}\nballots={}\noutstanding={}",
            state.players.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            state.turn_index,
            vote.target,
            vote.ballots.len(),
            vote.outstanding,
        );

        insta::assert_snapshot!(rendered, @r#"
        players=["A", "B", "C"]
        turn=1
        target=C
        ballots=1
        outstanding=2
        "#);
    }
}
