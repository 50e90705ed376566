/// Property-based tests for bracket progression and prize distribution
///
/// Every tournament size from 2 to 32 is played to completion with random
/// seeding, random winners and a random completion order.
use chrono::Utc;
use proptest::prelude::*;
use race_cup::tournament::{
    MatchKey, MatchStatus, PlayerId, Seeding, Tournament, TournamentConfig, TournamentStatus,
    advancer, rounds_for, split_prize_pool,
};
use std::collections::HashSet;

fn waiting_tournament(players: usize, entry_fee: i64) -> Tournament {
    let config = TournamentConfig::single_elimination("Property Cup", players, entry_fee);
    let mut tournament = Tournament::new(config, 1, Utc::now()).unwrap();
    for p in 1..=players as PlayerId {
        tournament.add_player(p, Utc::now()).unwrap();
    }
    tournament
}

/// Play every ready match of the current round in the order given by `picks`
fn play_out(tournament: &mut Tournament, picks: &[(usize, bool)]) -> Result<usize, TestCaseError> {
    let mut played = 0;
    let mut pick = picks.iter().cycle();
    let mut last_round = tournament.current_round;

    while tournament.status == TournamentStatus::Active {
        let ready = tournament.current_round_matches();
        prop_assert!(!ready.is_empty(), "active tournament with nothing to play");

        let &(index, first) = pick.next().unwrap_or(&(0, true));
        let key = ready[index % ready.len()];
        let game = tournament.bracket.get(key).unwrap().clone();
        let winner = (if first { game.player1 } else { game.player2 }).unwrap();

        let advancement = advancer::complete_match(tournament, key, winner, Utc::now()).unwrap();
        played += 1;

        prop_assert!(tournament.current_round >= last_round);
        prop_assert!(tournament.current_round <= tournament.bracket.final_round().unwrap());
        last_round = tournament.current_round;

        if advancement.tournament_completed() {
            prop_assert_eq!(tournament.status, TournamentStatus::Completed);
        }
    }

    Ok(played)
}

proptest! {
    #[test]
    fn test_every_bracket_completes(
        players in 2usize..=32,
        entry_fee in 0i64..=1_000,
        shuffle in any::<bool>(),
        picks in prop::collection::vec((0usize..16, any::<bool>()), 1..64),
    ) {
        let mut tournament = waiting_tournament(players, entry_fee);
        let seeding = if shuffle { Seeding::Shuffled } else { Seeding::JoinOrder };
        advancer::start(&mut tournament, seeding, Utc::now()).unwrap();

        prop_assert_eq!(tournament.bracket.num_rounds(), rounds_for(players));

        // Every player is seeded exactly once
        let seeded: Vec<PlayerId> = tournament
            .bracket
            .round_matches(0)
            .flat_map(|m| [m.player1, m.player2])
            .flatten()
            .collect();
        let unique: HashSet<PlayerId> = seeded.iter().copied().collect();
        prop_assert_eq!(seeded.len(), players);
        prop_assert_eq!(unique.len(), players);

        let played = play_out(&mut tournament, &picks)?;

        // A knockout of N players eliminates N-1 of them
        prop_assert_eq!(played, players - 1);
        prop_assert!(tournament.bracket.matches().iter().all(|m| m.status == MatchStatus::Completed));

        for game in tournament.bracket.matches() {
            let winner = game.winner.unwrap();
            prop_assert!(game.involves(winner));
            if game.bye {
                prop_assert!(!game.has_both_players());
            } else {
                prop_assert!(game.has_both_players());
            }
        }

        // Prizes
        prop_assert_eq!(tournament.total_awarded(), tournament.prize_pool);
        let results = tournament.prize_distribution();
        prop_assert_eq!(results.len(), players);
        prop_assert_eq!(results[0].player_id, tournament.bracket.final_match().unwrap().winner.unwrap());
        prop_assert!(results.iter().all(|r| r.prize <= results[0].prize));
    }

    #[test]
    fn test_completed_match_cannot_be_replayed(
        players in 2usize..=32,
        picks in prop::collection::vec((0usize..16, any::<bool>()), 1..8),
    ) {
        let mut tournament = waiting_tournament(players, 10);
        advancer::start(&mut tournament, Seeding::Shuffled, Utc::now()).unwrap();

        let key = tournament.current_round_matches()[picks[0].0 % tournament.current_round_matches().len()];
        let winner = tournament.bracket.get(key).unwrap().player1.unwrap();
        advancer::complete_match(&mut tournament, key, winner, Utc::now()).unwrap();

        let snapshot = tournament.clone();
        let again = advancer::complete_match(&mut tournament, key, winner, Utc::now());
        prop_assert!(again.is_err());
        prop_assert_eq!(tournament, snapshot);
    }

    #[test]
    fn test_prize_split_conserves_pool(
        players in 2usize..=32,
        pool in 0i64..=10_000_000,
        champion_index in 0usize..32,
    ) {
        let ids: Vec<PlayerId> = (100..100 + players as PlayerId).collect();
        let champion = ids[champion_index % players];
        let awards = split_prize_pool(pool, champion, &ids);

        prop_assert_eq!(awards.iter().map(|a| a.prize).sum::<i64>(), pool);
        prop_assert_eq!(awards[0].player_id, champion);
        let share = awards[1].prize;
        prop_assert!(awards[1..].iter().all(|a| a.prize == share));
        prop_assert!(awards[0].prize >= pool * 60 / 100);

        let positions: Vec<usize> = awards.iter().map(|a| a.position).collect();
        prop_assert_eq!(positions, (1..=players).collect::<Vec<_>>());
    }
}

#[test]
fn test_round_sizes_shrink_by_half() {
    let mut tournament = waiting_tournament(9, 0);
    advancer::start(&mut tournament, Seeding::JoinOrder, Utc::now()).unwrap();

    let sizes: Vec<usize> = (0..tournament.bracket.num_rounds())
        .map(|r| tournament.bracket.round_matches(r).count())
        .collect();
    assert_eq!(sizes, vec![5, 3, 2, 1]);
    assert!(tournament.bracket.get(MatchKey::new(0, 4)).unwrap().bye);
}
