use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the engine. Every fallible operation validates before it
/// mutates, so a caller receiving one of these sees unchanged state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid bet {amount}: {reason}")]
    InvalidBet { amount: i64, reason: String },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("the shoe is exhausted")]
    ShoeExhausted,

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub(crate) fn invalid_bet(amount: i64, reason: impl Into<String>) -> Self {
        EngineError::InvalidBet {
            amount,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig(reason.into())
    }
}
