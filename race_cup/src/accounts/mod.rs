//! Account ledger owning player coin balances.
//!
//! The tournament subsystem never holds coins itself: entry fees are debited,
//! refunds and prizes credited, through an [`AccountLedger`]. Every movement
//! carries an idempotency key so retried requests are applied once.
//!
//! Two backends are provided:
//! - [`MemoryAccountLedger`] for tests and single-process deployments
//! - [`PgAccountLedger`] backed by the `accounts` and `ledger_entries` tables

pub mod errors;
pub mod ledger;
pub mod manager;
pub mod models;

pub use errors::{AccountError, AccountResult};
pub use ledger::{AccountLedger, MemoryAccountLedger, reversal_key};
pub use manager::PgAccountLedger;
pub use models::{Account, EntryDirection, EntryType, LedgerEntry};
