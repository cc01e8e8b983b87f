use rust_decimal::Decimal;
use thiserror::Error;

/// Domain failures returned to the caller. Presentation decides how to word them.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid prediction: {reason}")]
    InvalidPrediction { reason: String },

    #[error("match {match_id} has already started")]
    MatchAlreadyStarted { match_id: String },

    #[error("match {match_id} has already finished")]
    MatchAlreadyFinished { match_id: String },

    /// Scoring was asked for before a result exists. Callers should check first.
    #[error("match {match_id} has no result yet")]
    ResultMissing { match_id: String },

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("cannot move {entity} {id} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("match {match_id} is in {found}, pool {pool_id} only takes {expected} matches")]
    LeagueMismatch {
        pool_id: String,
        match_id: String,
        expected: String,
        found: String,
    },

    #[error("unknown match: {0}")]
    UnknownMatch(String),

    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("no account registered for {0}")]
    UnknownEmail(String),

    #[error("an account already exists for {0}")]
    EmailTaken(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("admin privileges required")]
    AdminOnly,

    #[error("already joined pool {0}")]
    AlreadyJoined(String),

    #[error("not a member of pool {0}")]
    NotJoined(String),

    #[error("match {match_id} is not part of pool {pool_id}")]
    MatchNotInPool { pool_id: String, match_id: String },

    #[error("pool {0} is closed")]
    PoolClosed(String),

    #[error("pool {0} is not completed yet")]
    PoolNotCompleted(String),

    #[error("jackpot for pool {0} was already paid out")]
    JackpotSettled(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Stable short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPrediction { .. } => "invalid_prediction",
            Self::MatchAlreadyStarted { .. } => "match_already_started",
            Self::MatchAlreadyFinished { .. } => "match_already_finished",
            Self::ResultMissing { .. } => "result_missing",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::LeagueMismatch { .. } => "league_mismatch",
            Self::UnknownMatch(_) => "unknown_match",
            Self::UnknownPool(_) => "unknown_pool",
            Self::UnknownUser(_) => "unknown_user",
            Self::UnknownEmail(_) => "unknown_email",
            Self::EmailTaken(_) => "email_taken",
            Self::NotSignedIn => "not_signed_in",
            Self::AdminOnly => "admin_only",
            Self::AlreadyJoined(_) => "already_joined",
            Self::NotJoined(_) => "not_joined",
            Self::MatchNotInPool { .. } => "match_not_in_pool",
            Self::PoolClosed(_) => "pool_closed",
            Self::PoolNotCompleted(_) => "pool_not_completed",
            Self::JackpotSettled(_) => "jackpot_settled",
            Self::Storage(_) => "storage",
        }
    }
}
