//! Error taxonomy shared by the session and match layers

use uuid::Uuid;

/// Errors raised while handling connection and gameplay events.
///
/// None of these are fatal; handlers log them and carry on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Connection is not authenticated")]
    Unauthorized,

    #[error("Unknown or ended match: {0}")]
    UnknownMatch(Uuid),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Record storage failed: {0}")]
    StorageFailure(String),

    #[error("Already in a pending or active match: {0}")]
    MatchInProgress(Uuid),

    #[error("Not enough players present ({present} of {required})")]
    NotEnoughPlayers { present: usize, required: usize },

    #[error("Not a participant of match {0}")]
    NotInMatch(Uuid),
}

impl GameError {
    /// Short machine-readable code sent to clients in `error` messages
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Unauthorized => "unauthorized",
            GameError::UnknownMatch(_) => "unknown_match",
            GameError::InvalidAction(_) => "invalid_action",
            GameError::StorageFailure(_) => "storage_failure",
            GameError::MatchInProgress(_) => "match_in_progress",
            GameError::NotEnoughPlayers { .. } => "not_enough_players",
            GameError::NotInMatch(_) => "not_in_match",
        }
    }
}
