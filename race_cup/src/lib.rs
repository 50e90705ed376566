//! # Race Cup
//!
//! Tournament backend for a casual racing game: single-elimination brackets,
//! concurrent match reporting and exactly-once prize payouts.
//!
//! ## Core Modules
//!
//! - [`tournament`]: Bracket generation, round advancement, prizes and the
//!   per-tournament actor that serializes writes
//! - [`accounts`]: Coin ledger the tournaments charge and pay through
//! - [`db`]: Tournament persistence (in-memory and PostgreSQL)
//! - [`events`]: Real-time events for lobby and bracket views
//!
//! ## Example
//!
//! ```
//! use race_cup::tournament::{Bracket, Seeding};
//!
//! let bracket = Bracket::generate(&[1, 2, 3, 4, 5], Seeding::JoinOrder).unwrap();
//! assert_eq!(bracket.num_rounds(), 3);
//! ```

pub mod accounts;
pub mod db;
pub mod events;
pub mod tournament;

pub use tournament::{
    Tournament, TournamentConfig, TournamentError, TournamentId, TournamentManager,
    TournamentResult, TournamentStatus,
};
