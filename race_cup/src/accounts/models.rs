//! Account ledger data models.

use crate::tournament::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coin balance and tournament record of one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub player_id: PlayerId,
    pub coins: i64,
    pub tournaments_won: i32,
    pub updated_at: DateTime<Utc>,
}

/// Ledger entry (one per balance movement)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub player_id: PlayerId,
    /// Signed: negative for debits
    pub amount: i64,
    pub balance_after: i64,
    pub direction: EntryDirection,
    pub entry_type: EntryType,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    EntryFee,
    Refund,
    Prize,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::EntryFee => write!(f, "entry_fee"),
            EntryType::Refund => write!(f, "refund"),
            EntryType::Prize => write!(f, "prize"),
        }
    }
}
