use crate::{amm::AmmError, games::GameError, state::PreconditionFailed};
use memento_types::{GameStatus, Key};

/// Every way an intent can be rejected.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("amount must be positive and finite")]
    InvalidAmount,
    #[error("pool has an empty reserve")]
    PoolInactive,
    #[error(transparent)]
    PreconditionFailed(#[from] PreconditionFailed),
    #[error("invalid move: {0}")]
    InvalidMove(&'static str),
    #[error("game cannot be joined")]
    GameNotJoinable,
    #[error("bet proposal rejected: {0}")]
    BetProposalRejected(&'static str),
    #[error("not found: {0:?}")]
    NotFound(Key),
    #[error("already seated at an open game")]
    AlreadyInGame,
    #[error("not a participant")]
    NotParticipant,
    #[error("cannot {action} a {} game", .from.as_str())]
    InvalidTransition {
        from: GameStatus,
        action: &'static str,
    },
    #[error("slippage exceeded: wanted at least {min_out}, got {out}")]
    SlippageExceeded { min_out: f64, out: f64 },
    #[error("token already issued")]
    AlreadyIssued,
    #[error("equity already exchanged")]
    AlreadyExchanged,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("state corrupted: {0}")]
    Corrupted(String),
}

impl Error {
    /// Only a lost race is worth re-running against fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }
}

impl From<AmmError> for Error {
    fn from(err: AmmError) -> Self {
        match err {
            AmmError::InvalidAmount => Self::InvalidAmount,
            AmmError::PoolInactive => Self::PoolInactive,
            AmmError::Corrupted(reason) => Self::Corrupted(reason.to_string()),
        }
    }
}

impl From<GameError> for Error {
    fn from(err: GameError) -> Self {
        match err {
            GameError::InvalidAmount => Self::InvalidAmount,
            GameError::InvalidMove(reason) => Self::InvalidMove(reason),
            GameError::InvalidInput(reason) => Self::InvalidInput(reason),
            GameError::NotJoinable => Self::GameNotJoinable,
            GameError::BetRejected(reason) => Self::BetProposalRejected(reason),
            GameError::NotParticipant => Self::NotParticipant,
            GameError::InvalidTransition { from, action } => {
                Self::InvalidTransition { from, action }
            }
        }
    }
}
