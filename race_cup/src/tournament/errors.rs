//! Tournament error types.

use super::{
    bracket::MatchKey,
    models::{BracketType, PlayerId, TournamentId, TournamentStatus},
};
use crate::{accounts::AccountError, db::StoreError};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range
    Validation,
    /// Operation not valid for the current status
    StateConflict,
    /// Unknown tournament, match or player
    NotFound,
    /// Entry fee cannot be paid
    InsufficientFunds,
    /// Caller may not perform this operation
    Unauthorized,
    /// Account ledger or storage failed; safe to retry
    ExternalDependency,
}

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Invalid tournament name: {0:?}")]
    InvalidName(String),

    #[error("Invalid player limit {0}: must be between 2 and 32")]
    InvalidMaxPlayers(usize),

    #[error("Invalid entry fee {0}: must be between 0 and {max}", max = super::models::MAX_ENTRY_FEE)]
    InvalidEntryFee(i64),

    #[error("Invalid race settings: {0}")]
    InvalidSettings(String),

    #[error("Unsupported bracket type: {0}")]
    UnsupportedBracketType(BracketType),

    #[error("Invalid bracket size: need at least 2 players, have {0}")]
    InvalidBracketSize(usize),

    #[error("Player {winner} is not racing in match {key}")]
    InvalidWinner { key: MatchKey, winner: PlayerId },

    #[error("Tournament not found: {0}")]
    NotFound(TournamentId),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchKey),

    #[error("Player {0} is not in this tournament")]
    PlayerNotFound(PlayerId),

    #[error("Tournament is full ({max_players} players)")]
    TournamentFull { max_players: usize },

    #[error("Player {0} already joined")]
    AlreadyJoined(PlayerId),

    #[error("Tournament not in correct state: expected {expected}, got {actual}")]
    InvalidState {
        expected: TournamentStatus,
        actual: TournamentStatus,
    },

    #[error("Insufficient players: need {needed}, have {current}")]
    InsufficientPlayers { needed: usize, current: usize },

    #[error("Match {0} already completed")]
    MatchAlreadyCompleted(MatchKey),

    #[error("Match {key} is not in the current round {current_round}")]
    MatchNotInCurrentRound { key: MatchKey, current_round: u32 },

    #[error("Match {0} is still waiting for players")]
    MatchNotReady(MatchKey),

    #[error("Insufficient coins: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    #[error("Only the tournament creator can start the tournament")]
    NotCreator,

    #[error("Account ledger error: {0}")]
    Accounts(AccountError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Tournament {0} is not accepting requests")]
    Unavailable(TournamentId),
}

impl From<AccountError> for TournamentError {
    fn from(error: AccountError) -> Self {
        match error {
            AccountError::InsufficientBalance {
                available,
                required,
                ..
            } => TournamentError::InsufficientFunds {
                available,
                required,
            },
            other => TournamentError::Accounts(other),
        }
    }
}

impl TournamentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TournamentError::InvalidName(_)
            | TournamentError::InvalidMaxPlayers(_)
            | TournamentError::InvalidEntryFee(_)
            | TournamentError::InvalidSettings(_)
            | TournamentError::UnsupportedBracketType(_)
            | TournamentError::InvalidBracketSize(_)
            | TournamentError::InvalidWinner { .. } => ErrorKind::Validation,

            TournamentError::NotFound(_)
            | TournamentError::MatchNotFound(_)
            | TournamentError::PlayerNotFound(_) => ErrorKind::NotFound,

            TournamentError::TournamentFull { .. }
            | TournamentError::AlreadyJoined(_)
            | TournamentError::InvalidState { .. }
            | TournamentError::InsufficientPlayers { .. }
            | TournamentError::MatchAlreadyCompleted(_)
            | TournamentError::MatchNotInCurrentRound { .. }
            | TournamentError::MatchNotReady(_) => ErrorKind::StateConflict,

            TournamentError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,

            TournamentError::NotCreator => ErrorKind::Unauthorized,

            TournamentError::Accounts(_)
            | TournamentError::Store(_)
            | TournamentError::Timeout(_)
            | TournamentError::Unavailable(_) => ErrorKind::ExternalDependency,
        }
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            TournamentError::Accounts(e) => e.client_message(),
            TournamentError::Store(_) => "Storage unavailable, please retry".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for tournament operations
pub type TournamentResult<T> = Result<T, TournamentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            TournamentError::TournamentFull { max_players: 4 }.kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            TournamentError::MatchAlreadyCompleted(MatchKey::new(0, 0)).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(TournamentError::NotCreator.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            TournamentError::InvalidBracketSize(1).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            TournamentError::Timeout("account ledger").kind(),
            ErrorKind::ExternalDependency
        );
    }

    #[test]
    fn test_insufficient_balance_maps_to_funds() {
        let error: TournamentError = AccountError::InsufficientBalance {
            player_id: 3,
            available: 10,
            required: 50,
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::InsufficientFunds);

        let error: TournamentError = AccountError::AccountNotFound(3).into();
        assert_eq!(error.kind(), ErrorKind::ExternalDependency);
    }

    #[test]
    fn test_store_errors_are_sanitized() {
        let error = TournamentError::Store(StoreError::Unavailable("connection refused".into()));
        assert!(!error.client_message().contains("refused"));
    }
}
