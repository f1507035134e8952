//! Turn pointer over the roster.
//!
//! # Invariants
//!
//! - With a non-empty roster the pointer is in `[0, len)`.
//! - With an empty roster the pointer is 0 and the game is not started.
//!
//! Callers must invoke [`TurnScheduler::renormalize`] after every roster
//! mutation to keep the first invariant.
//!
//! Any explicit move of the pointer ([`TurnScheduler::start`],
//! [`TurnScheduler::advance`], [`TurnScheduler::set`]) puts the game in
//! progress, so a pointer that was moved always names a turn owner.

/// Turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No game started yet
    #[default]
    NotStarted,
    /// A turn owner is active
    InProgress,
}

/// Tracks the single active turn owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnScheduler {
    index: usize,
    phase: TurnPhase,
}

impl TurnScheduler {
    /// Scheduler at index 0, not started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw pointer value.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current phase.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Index of the turn owner, if a game is running over `len` players.
    pub fn current(&self, len: usize) -> Option<usize> {
        (self.phase == TurnPhase::InProgress && self.index < len).then_some(self.index)
    }

    /// Begin the game at `start`, which must be `< len`.
    pub fn start(&mut self, start: usize, len: usize) {
        debug_assert!(start < len);
        self.index = start;
        self.phase = TurnPhase::InProgress;
    }

    /// Move to the next player. Returns the new index, or `None` if the
    /// roster is empty.
    pub fn advance(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        self.index = (self.index + 1) % len;
        self.phase = TurnPhase::InProgress;
        Some(self.index)
    }

    /// Point at an explicit index, which must be `< len`.
    pub fn set(&mut self, index: usize, len: usize) {
        debug_assert!(index < len);
        self.index = index;
        self.phase = TurnPhase::InProgress;
    }

    /// Restore the pointer invariant after the roster changed to `len`
    /// players.
    pub fn renormalize(&mut self, len: usize) {
        if len == 0 {
            self.index = 0;
            self.phase = TurnPhase::NotStarted;
        } else {
            self.index %= len;
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn not_started_has_no_owner() {
        let turns = TurnScheduler::new();
        assert_eq!(turns.current(3), None);
        assert_eq!(turns.phase(), TurnPhase::NotStarted);
    }

    #[test]
    fn advance_wraps() {
        let mut turns = TurnScheduler::new();
        turns.start(2, 3);

        assert_eq!(turns.advance(3), Some(0));
        assert_eq!(turns.advance(3), Some(1));
        assert_eq!(turns.current(3), Some(1));
    }

    #[test]
    fn advance_on_empty_roster() {
        let mut turns = TurnScheduler::new();
        assert_eq!(turns.advance(0), None);
        assert_eq!(turns.index(), 0);
        assert_eq!(turns.phase(), TurnPhase::NotStarted);
    }

    #[test]
    fn explicit_moves_start_the_game() {
        let mut turns = TurnScheduler::new();
        turns.set(2, 3);
        assert_eq!(turns.current(3), Some(2));

        let mut turns = TurnScheduler::new();
        assert_eq!(turns.advance(3), Some(1));
        assert_eq!(turns.current(3), Some(1));
    }

    #[test]
    fn renormalize_to_empty_resets() {
        let mut turns = TurnScheduler::new();
        turns.start(1, 2);
        turns.renormalize(0);

        assert_eq!(turns.index(), 0);
        assert_eq!(turns.phase(), TurnPhase::NotStarted);
    }

    proptest! {
        #[test]
        fn pointer_stays_in_range(
            start in 0usize..16,
            lens in prop::collection::vec(0usize..16, 1..32),
        ) {
            let mut turns = TurnScheduler::new();
            let first = lens[0].max(1);
            turns.start(start % first, first);

            for len in lens {
                turns.renormalize(len);
                turns.advance(len);
                if len == 0 {
                    prop_assert_eq!(turns.index(), 0);
                } else {
                    prop_assert!(turns.index() < len);
                }
            }
        }
    }
}
