//! Account ledger error types.

use crate::tournament::PlayerId;
use thiserror::Error;

/// Account ledger errors
#[derive(Debug, Error)]
pub enum AccountError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Insufficient coins
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        player_id: PlayerId,
        available: i64,
        required: i64,
    },

    /// Account not found
    #[error("Account not found for player {0}")]
    AccountNotFound(PlayerId),

    /// Duplicate transaction (idempotency key already used)
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Invalid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Ledger backend unreachable
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl AccountError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            // Sanitize database errors - don't expose SQL details
            AccountError::Database(_) | AccountError::Unavailable(_) => {
                "Account service unavailable, please retry".to_string()
            }
            AccountError::AccountNotFound(_) => "Account not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for account operations
pub type AccountResult<T> = Result<T, AccountError>;
