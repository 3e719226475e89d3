use thiserror::Error;

use crate::store::StoreError;

/// Failure taxonomy for command handling. Every variant maps to an
/// `error`/`adminError` event for the originating connection; none of them
/// may take the coordination process down.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("{0}")]
    Validation(String),

    #[error("Game {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Authorization(String),

    #[error("Room id {0} is already in use")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Convenience type alias for Results using GameError
pub type Result<T> = std::result::Result<T, GameError>;

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        GameError::Authorization(msg.into())
    }
}
