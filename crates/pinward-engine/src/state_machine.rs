//! Bolt state tracking.
//!
//! Each lock owns a [`LockStateMachine`] that records the bolt position the
//! coordinator has accepted, along with a bounded history of transitions.
//!
//! # Valid Transitions
//!
//! - Unknown → Locked / Unlocked
//! - Locked → Unlocked
//! - Unlocked → Locked
//! - any → Unknown (through [`LockStateMachine::mark_unknown`], on disconnect)
//!
//! # Examples
//!
//! ```
//! use pinward_core::LockState;
//! use pinward_engine::LockStateMachine;
//!
//! let mut machine = LockStateMachine::new();
//! assert_eq!(machine.current_state(), LockState::Unknown);
//!
//! machine.transition_to(LockState::Locked).unwrap();
//! machine.transition_to(LockState::Unlocked).unwrap();
//! assert_eq!(machine.history().len(), 2);
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use pinward_core::{Error, LockState, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of state transitions to keep in history.
///
/// A busy front door sees a few dozen lock/unlock cycles a day, so this
/// keeps roughly the last day of activity.
const MAX_HISTORY_SIZE: usize = 100;

/// Whether the bolt may move from `from` to `to`.
///
/// ```
/// use pinward_core::LockState;
/// use pinward_engine::state_machine::can_transition;
///
/// assert!(can_transition(LockState::Unknown, LockState::Locked));
/// assert!(!can_transition(LockState::Locked, LockState::Locked));
/// ```
pub fn can_transition(from: LockState, to: LockState) -> bool {
    matches!(
        (from, to),
        (LockState::Unknown, LockState::Locked | LockState::Unlocked)
            | (LockState::Locked, LockState::Unlocked)
            | (LockState::Unlocked, LockState::Locked)
    )
}

/// A single accepted bolt transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: LockState,
    pub to: LockState,
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: LockState, to: LockState) -> Self {
        Self {
            from,
            to,
            at: Utc::now(),
        }
    }
}

/// Bolt position of one lock with transition history.
///
/// Not thread-safe; the coordinator owns one per lock.
#[derive(Debug)]
pub struct LockStateMachine {
    current_state: LockState,
    history: VecDeque<StateTransition>,
}

impl LockStateMachine {
    /// New machine in the `Unknown` state.
    pub fn new() -> Self {
        Self {
            current_state: LockState::Unknown,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> LockState {
        self.current_state
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Move the bolt to `new_state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] when the move is not
    /// allowed from the current state, including a move to the same state.
    pub fn transition_to(&mut self, new_state: LockState) -> Result<StateTransition> {
        if !can_transition(self.current_state, new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Forget the bolt position, for example after losing the connection.
    ///
    /// Returns `None` when the state was already unknown.
    pub fn mark_unknown(&mut self) -> Option<StateTransition> {
        if self.current_state == LockState::Unknown {
            return None;
        }
        let transition = StateTransition::new(self.current_state, LockState::Unknown);
        self.perform_state_change(LockState::Unknown, transition.clone());
        Some(transition)
    }

    fn perform_state_change(&mut self, new_state: LockState, transition: StateTransition) {
        self.current_state = new_state;
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for LockStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LockState::Unknown, LockState::Locked, true)]
    #[case(LockState::Unknown, LockState::Unlocked, true)]
    #[case(LockState::Locked, LockState::Unlocked, true)]
    #[case(LockState::Unlocked, LockState::Locked, true)]
    #[case(LockState::Locked, LockState::Locked, false)]
    #[case(LockState::Unlocked, LockState::Unlocked, false)]
    #[case(LockState::Locked, LockState::Unknown, false)]
    #[case(LockState::Unknown, LockState::Unknown, false)]
    fn test_transition_table(#[case] from: LockState, #[case] to: LockState, #[case] valid: bool) {
        assert_eq!(can_transition(from, to), valid);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut machine = LockStateMachine::new();
        machine.transition_to(LockState::Locked).unwrap();

        let err = machine.transition_to(LockState::Locked).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(machine.current_state(), LockState::Locked);
        assert_eq!(machine.history().len(), 1);
    }

    #[test]
    fn test_mark_unknown() {
        let mut machine = LockStateMachine::new();
        assert!(machine.mark_unknown().is_none());

        machine.transition_to(LockState::Unlocked).unwrap();
        let transition = machine.mark_unknown().unwrap();
        assert_eq!(transition.from, LockState::Unlocked);
        assert_eq!(transition.to, LockState::Unknown);
        assert_eq!(machine.current_state(), LockState::Unknown);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = LockStateMachine::new();
        machine.transition_to(LockState::Locked).unwrap();
        for i in 0..(MAX_HISTORY_SIZE + 20) {
            let next = if i % 2 == 0 {
                LockState::Unlocked
            } else {
                LockState::Locked
            };
            machine.transition_to(next).unwrap();
        }
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.history().back().unwrap().to, machine.current_state());
    }

    #[test]
    fn test_transition_serializes() {
        let transition = StateTransition::new(LockState::Locked, LockState::Unlocked);
        let json = serde_json::to_string(&transition).unwrap();
        assert!(json.contains("\"from\":\"locked\""));
        let back: StateTransition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to, LockState::Unlocked);
        assert_eq!(back.at, transition.at);
    }
}
