//! Playback state machine.
//!
//! The current state lives in a single atomic byte so the render callback can read it
//! without locking; only the control path writes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use pcm_player_types::PlayState;

use crate::error::{PlayerError, Result};

/// Operations that are validated against the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Initialize,
    Play,
    Pause,
    Resume,
    Stop,
    Release,
    Feed,
    SetVolume,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Initialize => "initialize",
            Transition::Play => "play",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Stop => "stop",
            Transition::Release => "release",
            Transition::Feed => "feed",
            Transition::SetVolume => "set volume",
        }
    }
}

/// Target state of `op` from `from`, or `None` when the transition is not allowed.
pub fn next_state(from: PlayState, op: Transition) -> Option<PlayState> {
    use PlayState::*;
    match (op, from) {
        (Transition::Initialize, Uninitialized) => Some(Stopped),
        (Transition::Play, Stopped | Paused) => Some(Playing),
        (Transition::Pause, Playing) => Some(Paused),
        (Transition::Resume, Paused) => Some(Playing),
        (Transition::Stop, Stopped | Playing | Paused) => Some(Stopped),
        (Transition::Release, Stopped | Playing | Paused) => Some(Released),
        (Transition::Feed | Transition::SetVolume, state) if state != Released => Some(state),
        _ => None,
    }
}

/// Atomically readable state cell shared with the render path.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: PlayState) -> Self {
        Self(AtomicU8::new(state.code() as u8))
    }

    pub fn load(&self) -> PlayState {
        PlayState::from_code(self.0.load(Ordering::Acquire) as i32).unwrap_or(PlayState::Released)
    }

    pub fn is_playing(&self) -> bool {
        self.load() == PlayState::Playing
    }

    fn store(&self, state: PlayState) {
        self.0.store(state.code() as u8, Ordering::Release);
    }
}

/// Control-side owner of a player's lifecycle state.
///
/// Callers `check` an operation first, perform its side effects, then `commit` the target
/// state; a failed side effect therefore leaves the state untouched.
#[derive(Debug)]
pub struct StateMachine {
    cell: Arc<StateCell>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(StateCell::new(PlayState::Uninitialized)),
        }
    }

    pub fn current(&self) -> PlayState {
        self.cell.load()
    }

    /// Handle for the render path.
    pub fn cell(&self) -> Arc<StateCell> {
        self.cell.clone()
    }

    /// Validate `op` against the current state and return the state it leads to.
    pub fn check(&self, op: Transition) -> Result<PlayState> {
        let from = self.current();
        next_state(from, op).ok_or_else(|| PlayerError::invalid_state(op.name(), from))
    }

    pub fn commit(&mut self, to: PlayState) {
        let from = self.current();
        if from != to {
            tracing::debug!(from = %from, to = %to, "play state transition");
        }
        self.cell.store(to);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlayState::*;

    const ALL_STATES: [PlayState; 5] = [Uninitialized, Stopped, Playing, Paused, Released];
    const ALL_OPS: [Transition; 8] = [
        Transition::Initialize,
        Transition::Play,
        Transition::Pause,
        Transition::Resume,
        Transition::Stop,
        Transition::Release,
        Transition::Feed,
        Transition::SetVolume,
    ];

    #[test]
    fn transition_table_holds_exactly() {
        let valid = [
            (Uninitialized, Transition::Initialize, Stopped),
            (Stopped, Transition::Play, Playing),
            (Paused, Transition::Play, Playing),
            (Playing, Transition::Pause, Paused),
            (Paused, Transition::Resume, Playing),
            (Playing, Transition::Stop, Stopped),
            (Paused, Transition::Stop, Stopped),
            (Stopped, Transition::Stop, Stopped),
            (Stopped, Transition::Release, Released),
            (Playing, Transition::Release, Released),
            (Paused, Transition::Release, Released),
        ];

        for from in ALL_STATES {
            for op in ALL_OPS {
                let got = next_state(from, op);
                let expected = match op {
                    Transition::Feed | Transition::SetVolume => {
                        (from != Released).then_some(from)
                    }
                    _ => valid
                        .iter()
                        .find(|(f, o, _)| *f == from && *o == op)
                        .map(|(_, _, to)| *to),
                };
                assert_eq!(got, expected, "{op:?} from {from:?}");
            }
        }
    }

    #[test]
    fn released_rejects_everything() {
        for op in ALL_OPS {
            assert_eq!(next_state(Released, op), None, "{op:?}");
        }
    }

    #[test]
    fn failed_check_leaves_state_unchanged() {
        let mut sm = StateMachine::new();
        let to = sm.check(Transition::Initialize).unwrap();
        sm.commit(to);
        let err = sm.check(Transition::Resume).unwrap_err();
        assert_eq!(
            err,
            PlayerError::InvalidState {
                op: "resume",
                state: Stopped
            }
        );
        assert_eq!(sm.current(), Stopped);
    }

    #[test]
    fn cell_is_shared_with_readers() {
        let mut sm = StateMachine::new();
        let cell = sm.cell();
        assert_eq!(cell.load(), Uninitialized);
        sm.commit(Playing);
        assert!(cell.is_playing());
    }
}
