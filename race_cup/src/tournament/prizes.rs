//! Prize pool distribution.
//!
//! The champion takes 60% of the pool; every other entrant gets an equal
//! share of the remaining 40%. Losers are not ranked by elimination round,
//! positions 2.. follow join order. Coins are integers, so the division
//! remainder goes to the champion and the payouts always sum to the pool.

use super::models::{PlayerId, Tournament, TournamentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Champion share of the prize pool, in percent
pub const CHAMPION_SHARE_PERCENT: i64 = 60;

/// Final standing of one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeAward {
    pub player_id: PlayerId,
    /// 1 = champion
    pub position: usize,
    pub prize: i64,
}

/// Split `prize_pool` between `champion` and the rest of `players`.
///
/// `players` is in join order and must contain the champion.
pub fn split_prize_pool(prize_pool: i64, champion: PlayerId, players: &[PlayerId]) -> Vec<PrizeAward> {
    let others: Vec<PlayerId> = players.iter().copied().filter(|&p| p != champion).collect();

    // Widened so the multiplication cannot overflow; the share fits back in i64
    let mut champion_prize =
        (i128::from(prize_pool) * i128::from(CHAMPION_SHARE_PERCENT) / 100) as i64;
    let remaining = prize_pool - champion_prize;

    let share = if others.is_empty() {
        0
    } else {
        remaining / others.len() as i64
    };
    champion_prize += remaining - share * others.len() as i64;

    let mut awards = Vec::with_capacity(players.len());
    awards.push(PrizeAward {
        player_id: champion,
        position: 1,
        prize: champion_prize,
    });
    awards.extend(others.into_iter().enumerate().map(|(i, player_id)| PrizeAward {
        player_id,
        position: i + 2,
        prize: share,
    }));

    awards
}

/// Write final positions and prizes onto the tournament's players
pub(crate) fn distribute(tournament: &mut Tournament, champion: PlayerId) -> Vec<PrizeAward> {
    let awards = split_prize_pool(tournament.prize_pool, champion, &tournament.player_ids());

    for award in &awards {
        if let Some(player) = tournament
            .players
            .iter_mut()
            .find(|p| p.player_id == award.player_id)
        {
            player.final_position = Some(award.position);
            player.prize_awarded = award.prize;
        }
    }

    awards
}

/// A coin credit owed to one player at tournament completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeCredit {
    pub player_id: PlayerId,
    pub amount: i64,
    /// Champion also gets a tournament win recorded
    pub champion: bool,
    /// Unique per payout attempt and player, so one payout is applied once
    /// and a revoked payout never blocks the next attempt
    pub idempotency_key: String,
}

impl PrizeCredit {
    pub fn for_awards(tournament_id: TournamentId, payout_id: Uuid, awards: &[PrizeAward]) -> Vec<Self> {
        awards
            .iter()
            .map(|award| Self {
                player_id: award.player_id,
                amount: award.prize,
                champion: award.position == 1,
                idempotency_key: format!(
                    "tournament:{}:prize:{}:{}",
                    tournament_id,
                    award.player_id,
                    payout_id.simple()
                ),
            })
            .collect()
    }
}
