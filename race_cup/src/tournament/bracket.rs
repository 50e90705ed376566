//! Single-elimination bracket generation and the match arena.
//!
//! The bracket is a flat list of matches ordered by `(round, match_index)`.
//! Navigation never uses pointers: the parent of match `(r, i)` is
//! `(r + 1, i / 2)` and its feeders are `(r - 1, 2i)` and `(r - 1, 2i + 1)`.
//!
//! Placeholder matches that no feeder could ever reach are not created, so
//! every round `r > 0` holds `ceil(previous / 2)` matches. A match whose
//! second slot has no feeder is a bye and is resolved by the advancer.

use super::{
    errors::{TournamentError, TournamentResult},
    models::{MIN_PLAYERS, PlayerId},
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How round-0 slots are assigned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seeding {
    /// Uniform random permutation
    #[default]
    Shuffled,
    /// Players meet in join order
    JoinOrder,
}

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Created, possibly still waiting for players
    Pending,
    /// Launched in a race room
    Active,
    /// Winner decided
    Completed,
}

/// Player slot inside a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Player1,
    Player2,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Slot::Player1 => Slot::Player2,
            Slot::Player2 => Slot::Player1,
        }
    }
}

/// Stable match coordinates inside one tournament
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MatchKey {
    pub round: u32,
    pub match_index: u32,
}

impl MatchKey {
    pub fn new(round: u32, match_index: u32) -> Self {
        Self { round, match_index }
    }

    /// Match the winner of this one advances into
    pub fn parent(self) -> Self {
        Self::new(self.round + 1, self.match_index / 2)
    }

    /// Slot of the parent this match's winner occupies
    pub fn parent_slot(self) -> Slot {
        if self.match_index % 2 == 0 {
            Slot::Player1
        } else {
            Slot::Player2
        }
    }

    /// Match below `slot` whose winner fills it. None in round 0.
    pub fn feeder(self, slot: Slot) -> Option<Self> {
        if self.round == 0 {
            return None;
        }
        let offset = match slot {
            Slot::Player1 => 0,
            Slot::Player2 => 1,
        };
        Some(Self::new(self.round - 1, self.match_index * 2 + offset))
    }
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.round, self.match_index)
    }
}

/// A single race between two players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Match {
    pub round: u32,
    pub match_index: u32,
    pub player1: Option<PlayerId>,
    pub player2: Option<PlayerId>,
    pub winner: Option<PlayerId>,
    pub status: MatchStatus,
    /// Set when a lone player advanced without racing
    #[serde(default)]
    pub bye: bool,
    /// Race room instance, assigned on launch
    pub game_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    fn new(key: MatchKey, player1: Option<PlayerId>, player2: Option<PlayerId>) -> Self {
        Self {
            round: key.round,
            match_index: key.match_index,
            player1,
            player2,
            winner: None,
            status: MatchStatus::Pending,
            bye: false,
            game_id: None,
            completed_at: None,
        }
    }

    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.round, self.match_index)
    }

    pub fn slot(&self, slot: Slot) -> Option<PlayerId> {
        match slot {
            Slot::Player1 => self.player1,
            Slot::Player2 => self.player2,
        }
    }

    pub(crate) fn set_slot(&mut self, slot: Slot, player_id: PlayerId) {
        match slot {
            Slot::Player1 => self.player1 = Some(player_id),
            Slot::Player2 => self.player2 = Some(player_id),
        }
    }

    pub fn has_both_players(&self) -> bool {
        self.player1.is_some() && self.player2.is_some()
    }

    /// Pending with both slots filled
    pub fn is_ready(&self) -> bool {
        self.status == MatchStatus::Pending && self.has_both_players()
    }

    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }

    pub fn involves(&self, player_id: PlayerId) -> bool {
        self.player1 == Some(player_id) || self.player2 == Some(player_id)
    }
}

/// The match arena of one tournament, ordered by `(round, match_index)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bracket {
    matches: Vec<Match>,
}

/// Rounds needed for `players` entrants: ceil(log2(players))
pub fn rounds_for(players: usize) -> u32 {
    players.max(1).next_power_of_two().trailing_zeros()
}

impl Bracket {
    /// Build every round of the bracket from the joined players
    pub fn generate(players: &[PlayerId], seeding: Seeding) -> TournamentResult<Self> {
        if players.len() < MIN_PLAYERS {
            return Err(TournamentError::InvalidBracketSize(players.len()));
        }

        let mut seeds = players.to_vec();
        if seeding == Seeding::Shuffled {
            seeds.shuffle(&mut rand::rng());
        }

        let num_rounds = rounds_for(seeds.len());
        let mut matches = Vec::with_capacity(seeds.len());

        for (index, pair) in seeds.chunks(2).enumerate() {
            let key = MatchKey::new(0, index as u32);
            matches.push(Match::new(key, Some(pair[0]), pair.get(1).copied()));
        }

        // Later rounds hold ceil(previous / 2) placeholders, not the
        // 2^(num_rounds - round - 1) of a full power-of-two bracket: a slot no
        // earlier match can feed is never created, and the odd match out of a
        // round sends its winner on through a bye.
        let mut previous = matches.len();
        for round in 1..num_rounds {
            let count = previous.div_ceil(2);
            for index in 0..count {
                matches.push(Match::new(MatchKey::new(round, index as u32), None, None));
            }
            previous = count;
        }

        Ok(Self { matches })
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn num_rounds(&self) -> u32 {
        self.matches.last().map_or(0, |m| m.round + 1)
    }

    /// Round holding the single final match
    pub fn final_round(&self) -> Option<u32> {
        self.matches.last().map(|m| m.round)
    }

    pub fn final_match(&self) -> Option<&Match> {
        self.matches.last()
    }

    fn position(&self, key: MatchKey) -> Option<usize> {
        self.matches.binary_search_by_key(&key, Match::key).ok()
    }

    pub fn contains(&self, key: MatchKey) -> bool {
        self.position(key).is_some()
    }

    pub fn find_match(&self, round: u32, match_index: u32) -> Option<&Match> {
        self.get(MatchKey::new(round, match_index))
    }

    pub fn get(&self, key: MatchKey) -> Option<&Match> {
        self.position(key).map(|i| &self.matches[i])
    }

    pub(crate) fn get_mut(&mut self, key: MatchKey) -> Option<&mut Match> {
        self.position(key).map(move |i| &mut self.matches[i])
    }

    pub fn round_matches(&self, round: u32) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(move |m| m.round == round)
    }

    /// Matches of `current_round` that are Pending with both players seated
    pub fn current_round_matches(&self, current_round: u32) -> impl Iterator<Item = &Match> {
        self.round_matches(current_round).filter(|m| m.is_ready())
    }

    /// A round is complete once every one of its matches is Completed
    pub fn is_round_complete(&self, round: u32) -> bool {
        let mut matches = self.round_matches(round).peekable();
        matches.peek().is_some() && matches.all(Match::is_completed)
    }

    /// Whether `slot` of `key` can ever hold a player
    pub fn slot_is_live(&self, key: MatchKey, slot: Slot) -> bool {
        match key.feeder(slot) {
            Some(feeder) => self.contains(feeder),
            None => self.get(key).and_then(|m| m.slot(slot)).is_some(),
        }
    }

    pub(crate) fn matches_mut(&mut self) -> &mut [Match] {
        &mut self.matches
    }
}
