//! Round advancement: winner promotion, bye resolution, round and
//! tournament completion.

use super::{
    bracket::{Bracket, MatchKey, MatchStatus, Seeding},
    errors::{TournamentError, TournamentResult},
    models::{MIN_PLAYERS, PlayerId, Tournament, TournamentStatus},
    prizes::{self, PrizeAward},
};
use chrono::{DateTime, Utc};

/// What changed in the bracket after a transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advancement {
    /// Matches that completed, reported match first, then byes
    pub completed: Vec<MatchKey>,
    /// Matches that now have both players seated
    pub ready: Vec<MatchKey>,
    /// New current round, if it moved
    pub round_advanced: Option<u32>,
    /// Set when the final was decided
    pub champion: Option<PlayerId>,
    /// Payouts, set together with `champion`
    pub awards: Vec<PrizeAward>,
}

impl Advancement {
    pub fn tournament_completed(&self) -> bool {
        self.champion.is_some()
    }
}

/// Freeze membership, generate the bracket and resolve round-0 byes
pub fn start(
    tournament: &mut Tournament,
    seeding: Seeding,
    now: DateTime<Utc>,
) -> TournamentResult<Advancement> {
    tournament.ensure_status(TournamentStatus::Waiting)?;

    if tournament.players.len() < MIN_PLAYERS {
        return Err(TournamentError::InsufficientPlayers {
            needed: MIN_PLAYERS,
            current: tournament.players.len(),
        });
    }

    tournament.bracket = Bracket::generate(&tournament.player_ids(), seeding)?;
    tournament.status = TournamentStatus::Active;
    tournament.current_round = 0;
    tournament.started_at = Some(now);
    tournament.updated_at = now;

    let mut advancement = Advancement::default();
    let byes: Vec<(MatchKey, PlayerId)> = tournament
        .bracket
        .round_matches(0)
        .filter(|m| m.player2.is_none())
        .filter_map(|m| m.player1.map(|p| (m.key(), p)))
        .collect();

    for (key, player_id) in byes {
        settle_bye(&mut tournament.bracket, key, player_id, now, &mut advancement);
    }

    advancement.ready.extend(
        tournament
            .bracket
            .round_matches(0)
            .filter(|m| m.is_ready())
            .map(|m| m.key()),
    );

    settle_rounds(tournament, now, &mut advancement);
    Ok(advancement)
}

/// Record the winner of a match and advance the bracket.
///
/// All checks run before the first mutation, so a rejected call leaves the
/// tournament untouched.
pub fn complete_match(
    tournament: &mut Tournament,
    key: MatchKey,
    winner: PlayerId,
    now: DateTime<Utc>,
) -> TournamentResult<Advancement> {
    tournament.ensure_status(TournamentStatus::Active)?;

    let current_round = tournament.current_round;
    let game = tournament
        .bracket
        .get_mut(key)
        .ok_or(TournamentError::MatchNotFound(key))?;

    if game.status == MatchStatus::Completed {
        return Err(TournamentError::MatchAlreadyCompleted(key));
    }

    if key.round != current_round {
        return Err(TournamentError::MatchNotInCurrentRound { key, current_round });
    }

    if !game.has_both_players() {
        return Err(TournamentError::MatchNotReady(key));
    }

    if !game.involves(winner) {
        return Err(TournamentError::InvalidWinner { key, winner });
    }

    game.winner = Some(winner);
    game.status = MatchStatus::Completed;
    game.completed_at = Some(now);
    tournament.updated_at = now;

    let mut advancement = Advancement {
        completed: vec![key],
        ..Advancement::default()
    };

    promote(&mut tournament.bracket, key, winner, now, &mut advancement);
    settle_rounds(tournament, now, &mut advancement);

    Ok(advancement)
}

/// Complete a single-player match and carry its player upward
fn settle_bye(
    bracket: &mut Bracket,
    key: MatchKey,
    player_id: PlayerId,
    now: DateTime<Utc>,
    advancement: &mut Advancement,
) {
    let Some(game) = bracket.get_mut(key) else {
        return;
    };

    game.winner = Some(player_id);
    game.status = MatchStatus::Completed;
    game.bye = true;
    game.completed_at = Some(now);
    advancement.completed.push(key);

    log::debug!("Bye at match {key}: player {player_id} advances");
    promote(bracket, key, player_id, now, advancement);
}

/// Seat `winner` in the parent of `from`; a parent whose other slot can
/// never be filled is settled as a bye.
fn promote(
    bracket: &mut Bracket,
    from: MatchKey,
    winner: PlayerId,
    now: DateTime<Utc>,
    advancement: &mut Advancement,
) {
    let parent_key = from.parent();
    let slot = from.parent_slot();
    let sibling_live = bracket.slot_is_live(parent_key, slot.other());

    let Some(parent) = bracket.get_mut(parent_key) else {
        return;
    };

    parent.set_slot(slot, winner);

    if parent.has_both_players() {
        advancement.ready.push(parent_key);
    } else if !sibling_live {
        settle_bye(bracket, parent_key, winner, now, advancement);
    }
}

/// Move `current_round` past every completed round and finish the
/// tournament once the final is decided
fn settle_rounds(tournament: &mut Tournament, now: DateTime<Utc>, advancement: &mut Advancement) {
    let Some(final_round) = tournament.bracket.final_round() else {
        return;
    };

    while tournament.current_round < final_round
        && tournament.bracket.is_round_complete(tournament.current_round)
    {
        tournament.current_round += 1;
        advancement.round_advanced = Some(tournament.current_round);
        log::debug!(
            "Tournament {} advanced to round {}",
            tournament.id,
            tournament.current_round
        );
    }

    let champion = tournament
        .bracket
        .final_match()
        .filter(|m| m.is_completed())
        .and_then(|m| m.winner);

    if let Some(champion) = champion {
        finish(tournament, champion, now, advancement);
    }
}

/// Active -> Completed. Prizes are assigned only on this edge.
fn finish(
    tournament: &mut Tournament,
    champion: PlayerId,
    now: DateTime<Utc>,
    advancement: &mut Advancement,
) {
    if tournament.status != TournamentStatus::Active {
        return;
    }

    tournament.status = TournamentStatus::Completed;
    tournament.completed_at = Some(now);
    tournament.updated_at = now;

    advancement.awards = prizes::distribute(tournament, champion);
    advancement.champion = Some(champion);

    log::info!(
        "Tournament {} '{}' completed, champion {}",
        tournament.id,
        tournament.name,
        champion
    );
}
