//! Typed failures returned by every control-path operation.

use pcm_player_types::PlayState;

use crate::sink::SinkError;

/// Discriminant of a [`PlayerError`], for dispatchers that branch on the failure class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormat,
    InvalidState,
    SinkUnavailable,
    NotFound,
}

/// Failure of a player operation.
///
/// Every variant renders a human-readable message; [`PlayerError::code`] is the stable code
/// handed back across the dispatch boundary.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PlayerError {
    /// Malformed configuration or a buffer that does not hold whole frames.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The operation is not valid from the current state.
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: PlayState },

    /// The platform audio resource could not be opened or started.
    #[error("audio sink unavailable: {0}")]
    SinkUnavailable(String),

    /// No live player exists for the handle.
    #[error("no player for handle {0}")]
    NotFound(String),
}

impl PlayerError {
    /// Error code shared by all failures at the dispatch boundary.
    pub const CODE: &'static str = "Error";

    pub fn code(&self) -> &'static str {
        Self::CODE
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            PlayerError::InvalidState { .. } => ErrorKind::InvalidState,
            PlayerError::SinkUnavailable(_) => ErrorKind::SinkUnavailable,
            PlayerError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn invalid_format(details: impl Into<String>) -> Self {
        PlayerError::InvalidFormat(details.into())
    }

    pub fn invalid_state(op: &'static str, state: PlayState) -> Self {
        PlayerError::InvalidState { op, state }
    }
}

impl From<SinkError> for PlayerError {
    fn from(err: SinkError) -> Self {
        PlayerError::SinkUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
