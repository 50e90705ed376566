//! Tournament data models for single-elimination race tournaments.

use super::{
    bracket::{Bracket, MatchKey},
    errors::{TournamentError, TournamentResult},
    prizes::PrizeAward,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tournament ID type
pub type TournamentId = Uuid;

/// Player ID type (user id owned by the account service)
pub type PlayerId = i64;

/// Smallest bracket that can be played
pub const MIN_PLAYERS: usize = 2;

/// Largest allowed tournament
pub const MAX_PLAYERS: usize = 32;

/// Largest entry fee, in coins; keeps the prize pool of a full bracket within i64
pub const MAX_ENTRY_FEE: i64 = 1_000_000_000_000;

/// Allowed tournament name length (after trimming)
pub const NAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=50;

/// Tournament status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Accepting players
    Waiting,
    /// Bracket generated, matches being played
    Active,
    /// Final match decided, prizes paid
    Completed,
    /// Abandoned before start
    Cancelled,
}

impl TournamentStatus {
    /// Completed and Cancelled tournaments never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bracket format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketType {
    #[default]
    SingleElimination,
    DoubleElimination,
    RoundRobin,
}

impl std::fmt::Display for BracketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BracketType::SingleElimination => write!(f, "single_elimination"),
            BracketType::DoubleElimination => write!(f, "double_elimination"),
            BracketType::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// AI opponent difficulty for tournament races
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Race settings handed to the race room when a match is launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaceSettings {
    /// Laps per race
    pub race_laps: u8,
    /// AI opponent difficulty
    pub ai_difficulty: AiDifficulty,
    /// Track identifier
    pub track_id: String,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            race_laps: 3,
            ai_difficulty: AiDifficulty::Medium,
            track_id: "default".to_string(),
        }
    }
}

/// Tournament creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TournamentConfig {
    /// Tournament name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Maximum players allowed
    pub max_players: usize,
    /// Entry fee in coins
    pub entry_fee: i64,
    /// Bracket format
    #[serde(default)]
    pub bracket_type: BracketType,
    /// Race settings
    #[serde(default)]
    pub settings: RaceSettings,
}

impl TournamentConfig {
    /// Create a single-elimination configuration with default race settings
    pub fn single_elimination(name: impl Into<String>, max_players: usize, entry_fee: i64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            max_players,
            entry_fee,
            bracket_type: BracketType::SingleElimination,
            settings: RaceSettings::default(),
        }
    }

    /// Check the configuration before anything is charged or stored
    pub fn validate(&self) -> TournamentResult<()> {
        let name = self.name.trim();
        if !NAME_LENGTH.contains(&name.chars().count()) {
            return Err(TournamentError::InvalidName(self.name.clone()));
        }

        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.max_players) {
            return Err(TournamentError::InvalidMaxPlayers(self.max_players));
        }

        if !(0..=MAX_ENTRY_FEE).contains(&self.entry_fee) {
            return Err(TournamentError::InvalidEntryFee(self.entry_fee));
        }

        if self.bracket_type != BracketType::SingleElimination {
            return Err(TournamentError::UnsupportedBracketType(self.bracket_type));
        }

        if self.settings.race_laps == 0 {
            return Err(TournamentError::InvalidSettings(
                "race_laps must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// A player entered in a tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TournamentPlayer {
    pub player_id: PlayerId,
    pub joined_at: DateTime<Utc>,
    /// Set when the tournament completes
    pub final_position: Option<usize>,
    /// Coins awarded at completion
    #[serde(default)]
    pub prize_awarded: i64,
}

/// Tournament aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub description: String,
    pub max_players: usize,
    pub entry_fee: i64,
    /// max_players * entry_fee, fixed at creation
    pub prize_pool: i64,
    pub status: TournamentStatus,
    pub bracket_type: BracketType,
    pub creator: PlayerId,
    /// Join order
    pub players: Vec<TournamentPlayer>,
    pub bracket: Bracket,
    pub current_round: u32,
    pub settings: RaceSettings,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Tournament {
    /// Create a waiting tournament with no players.
    ///
    /// The creator is entered separately so the entry fee can be charged first.
    pub fn new(config: TournamentConfig, creator: PlayerId, now: DateTime<Utc>) -> TournamentResult<Self> {
        config.validate()?;

        let prize_pool = i64::try_from(config.max_players)
            .ok()
            .and_then(|players| players.checked_mul(config.entry_fee))
            .ok_or(TournamentError::InvalidEntryFee(config.entry_fee))?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: config.name.trim().to_string(),
            description: config.description,
            max_players: config.max_players,
            entry_fee: config.entry_fee,
            prize_pool,
            status: TournamentStatus::Waiting,
            bracket_type: config.bracket_type,
            creator,
            players: Vec::new(),
            bracket: Bracket::default(),
            current_round: 0,
            settings: config.settings,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        })
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&TournamentPlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.player(player_id).is_some()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.player_id).collect()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Fail unless the tournament is in `expected`
    pub fn ensure_status(&self, expected: TournamentStatus) -> TournamentResult<()> {
        if self.status != expected {
            return Err(TournamentError::InvalidState {
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    /// Validate a join without mutating anything
    pub fn check_join(&self, player_id: PlayerId) -> TournamentResult<()> {
        self.ensure_status(TournamentStatus::Waiting)?;

        if self.has_player(player_id) {
            return Err(TournamentError::AlreadyJoined(player_id));
        }

        if self.is_full() {
            return Err(TournamentError::TournamentFull {
                max_players: self.max_players,
            });
        }

        Ok(())
    }

    /// Append a player in join order
    pub fn add_player(&mut self, player_id: PlayerId, now: DateTime<Utc>) -> TournamentResult<()> {
        self.check_join(player_id)?;

        self.players.push(TournamentPlayer {
            player_id,
            joined_at: now,
            final_position: None,
            prize_awarded: 0,
        });
        self.updated_at = now;

        Ok(())
    }

    /// Validate a leave without mutating anything
    pub fn check_leave(&self, player_id: PlayerId) -> TournamentResult<()> {
        self.ensure_status(TournamentStatus::Waiting)?;

        if !self.has_player(player_id) {
            return Err(TournamentError::PlayerNotFound(player_id));
        }

        Ok(())
    }

    /// Remove a player. An emptied tournament becomes Cancelled.
    pub fn remove_player(&mut self, player_id: PlayerId, now: DateTime<Utc>) -> TournamentResult<()> {
        self.check_leave(player_id)?;

        self.players.retain(|p| p.player_id != player_id);
        if self.players.is_empty() {
            self.status = TournamentStatus::Cancelled;
            self.completed_at = Some(now);
        }
        self.updated_at = now;

        Ok(())
    }

    /// Matches of the current round that are ready but not yet launched
    pub fn current_round_matches(&self) -> Vec<MatchKey> {
        self.bracket
            .current_round_matches(self.current_round)
            .map(|m| m.key())
            .collect()
    }

    /// Final standings, sorted by position. Empty until the tournament completes.
    pub fn prize_distribution(&self) -> Vec<PrizeAward> {
        let mut awards: Vec<PrizeAward> = self
            .players
            .iter()
            .filter_map(|p| {
                p.final_position.map(|position| PrizeAward {
                    player_id: p.player_id,
                    position,
                    prize: p.prize_awarded,
                })
            })
            .collect();
        awards.sort_by_key(|a| a.position);
        awards
    }

    /// Sum of all prizes handed out so far
    pub fn total_awarded(&self) -> i64 {
        self.players.iter().map(|p| p.prize_awarded).sum()
    }

    pub fn summary(&self) -> TournamentSummary {
        TournamentSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            bracket_type: self.bracket_type,
            creator: self.creator,
            player_count: self.players.len(),
            max_players: self.max_players,
            entry_fee: self.entry_fee,
            prize_pool: self.prize_pool,
            current_round: self.current_round,
            created_at: self.created_at,
        }
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSummary {
    pub id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub bracket_type: BracketType,
    pub creator: PlayerId,
    pub player_count: usize,
    pub max_players: usize,
    pub entry_fee: i64,
    pub prize_pool: i64,
    pub current_round: u32,
    pub created_at: DateTime<Utc>,
}
