//! Single-elimination race tournaments.
//!
//! This module provides:
//! - Tournament creation, registration and entry fees
//! - Seeded bracket generation with automatic byes
//! - Winner promotion and round progression
//! - Prize distribution, paid exactly once
//! - One actor per live tournament serializing every write
//!
//! ## Example
//!
//! ```no_run
//! use race_cup::accounts::MemoryAccountLedger;
//! use race_cup::db::MemoryTournamentStore;
//! use race_cup::events::EventHub;
//! use race_cup::tournament::{CoordinatorSettings, TournamentConfig, TournamentManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TournamentManager::new(
//!         Arc::new(MemoryTournamentStore::new()),
//!         Arc::new(MemoryAccountLedger::default()),
//!         Arc::new(EventHub::default()),
//!         CoordinatorSettings::default(),
//!     );
//!
//!     // Four-player cup with a 100 coin entry fee, created by player 1
//!     let config = TournamentConfig::single_elimination("Sunday Cup", 4, 100);
//!     let tournament = manager.create(config, 1).await?;
//!
//!     for player in 2..=4 {
//!         manager.join(tournament.id, player).await?;
//!     }
//!     // Starting launches every ready match, so round 0 is already Active
//!     let started = manager.start(tournament.id, 1).await?;
//!     for game in started.bracket.round_matches(0) {
//!         println!(
//!             "{}: {:?} vs {:?} ({:?}, race {:?})",
//!             game.key(),
//!             game.player1,
//!             game.player2,
//!             game.status,
//!             game.game_id
//!         );
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod advancer;
pub mod bracket;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod models;
pub mod prizes;

pub use actor::{TournamentActor, TournamentHandle};
pub use advancer::Advancement;
pub use bracket::{Bracket, Match, MatchKey, MatchStatus, Seeding, Slot, rounds_for};
pub use config::CoordinatorSettings;
pub use errors::{ErrorKind, TournamentError, TournamentResult};
pub use manager::{BracketView, TournamentManager, TournamentResults};
pub use messages::TournamentMessage;
pub use models::{
    AiDifficulty, BracketType, MAX_ENTRY_FEE, MAX_PLAYERS, MIN_PLAYERS, PlayerId, RaceSettings, Tournament,
    TournamentConfig, TournamentId, TournamentPlayer, TournamentStatus, TournamentSummary,
};
pub use prizes::{PrizeAward, PrizeCredit, split_prize_pool};
