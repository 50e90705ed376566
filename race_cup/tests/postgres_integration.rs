//! Integration tests for the Postgres tournament store and account ledger.
//!
//! These need a running database: set `DATABASE_URL` and run with
//! `cargo test -- --ignored`. Every test uses fresh player and tournament
//! ids, and they run serially because retention sweeps touch shared rows.

use chrono::{Duration, Utc};
use race_cup::{
    accounts::{AccountError, AccountLedger, EntryDirection, EntryType, PgAccountLedger},
    db::{Database, DatabaseConfig, PgTournamentStore, TournamentStore},
    events::EventHub,
    tournament::{
        CoordinatorSettings, PlayerId, PrizeCredit, Seeding, Tournament, TournamentConfig,
        TournamentManager, TournamentStatus,
    },
};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;

/// Helper to create a test database pool with the schema in place
async fn setup_test_db() -> Arc<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| DatabaseConfig::development().database_url);

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        ..DatabaseConfig::development()
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.run_migrations().await.expect("Failed to run migrations");

    Arc::new(db.pool().clone())
}

/// Player id no earlier test run has used
fn fresh_player() -> PlayerId {
    1_000_000 + i64::from(rand::random::<u32>())
}

fn waiting(name: &str, players: &[PlayerId], created_offset_minutes: i64) -> Tournament {
    let created_at = Utc::now() - Duration::minutes(created_offset_minutes);
    let config = TournamentConfig::single_elimination(name, 8, 10);
    let mut tournament = Tournament::new(config, players[0], created_at).unwrap();
    for &player in players {
        tournament.add_player(player, created_at).unwrap();
    }
    tournament
}

fn prize(player_id: PlayerId, amount: i64, champion: bool, key: &str) -> PrizeCredit {
    PrizeCredit {
        player_id,
        amount,
        champion,
        idempotency_key: key.to_string(),
    }
}

// ============================================================================
// Tournament Store Tests
// ============================================================================

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_store_round_trip_keeps_document_intact() {
    let store = PgTournamentStore::new(setup_test_db().await);
    let (a, b) = (fresh_player(), fresh_player());
    let tournament = waiting("Harbor Cup", &[a, b], 0);

    store.save(&tournament).await.unwrap();
    assert_eq!(store.load(tournament.id).await.unwrap(), Some(tournament.clone()));

    store.delete(tournament.id).await.unwrap();
    assert_eq!(store.load(tournament.id).await.unwrap(), None);
    assert!(store.list_for_player(a).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_store_player_index_follows_saves() {
    let store = PgTournamentStore::new(setup_test_db().await);
    let (a, b) = (fresh_player(), fresh_player());
    let mut tournament = waiting("Canyon Cup", &[a, b], 0);
    store.save(&tournament).await.unwrap();

    let mine = store.list_for_player(b).await.unwrap();
    assert_eq!(mine.iter().map(|t| t.id).collect::<Vec<_>>(), vec![tournament.id]);

    tournament.remove_player(b, Utc::now()).unwrap();
    store.save(&tournament).await.unwrap();

    assert!(store.list_for_player(b).await.unwrap().is_empty());
    assert_eq!(store.list_for_player(a).await.unwrap().len(), 1);

    store.delete(tournament.id).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_store_lists_newest_first() {
    let store = PgTournamentStore::new(setup_test_db().await);
    let player = fresh_player();
    let older = waiting("Older Cup", &[player], 30);
    let newer = waiting("Newer Cup", &[player], 5);

    // Saved oldest last so insertion order cannot fake the ordering
    store.save(&newer).await.unwrap();
    store.save(&older).await.unwrap();

    let listed: Vec<_> = store
        .list(&[TournamentStatus::Waiting])
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .filter(|id| *id == older.id || *id == newer.id)
        .collect();
    assert_eq!(listed, vec![newer.id, older.id]);

    let history: Vec<_> = store
        .list_for_player(player)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(history, vec![newer.id, older.id]);

    assert!(
        !store
            .list(&[TournamentStatus::Completed])
            .await
            .unwrap()
            .iter()
            .any(|t| t.id == older.id)
    );

    store.delete(older.id).await.unwrap();
    store.delete(newer.id).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_store_retention_removes_only_stale_finished() {
    let store = PgTournamentStore::new(setup_test_db().await);
    let now = Utc::now();
    let player = fresh_player();

    let mut stale = waiting("Stale Cup", &[player], 60 * 24 * 10);
    stale.status = TournamentStatus::Completed;
    stale.completed_at = Some(now - Duration::days(8));

    let mut fresh = waiting("Fresh Cup", &[player], 60 * 24 * 2);
    fresh.status = TournamentStatus::Completed;
    fresh.completed_at = Some(now - Duration::days(1));

    let open = waiting("Open Cup", &[player], 60 * 24 * 30);

    for t in [&stale, &fresh, &open] {
        store.save(t).await.unwrap();
    }

    let removed = store
        .delete_finished_before(now - Duration::days(7))
        .await
        .unwrap();
    assert!(removed >= 1);

    assert_eq!(store.load(stale.id).await.unwrap(), None);
    assert!(store.load(fresh.id).await.unwrap().is_some());
    assert!(store.load(open.id).await.unwrap().is_some());

    store.delete(fresh.id).await.unwrap();
    store.delete(open.id).await.unwrap();
}

// ============================================================================
// Account Ledger Tests
// ============================================================================

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_ledger_debit_credit_and_history() {
    let ledger = PgAccountLedger::new(setup_test_db().await, 500);
    let player = fresh_player();

    assert!(matches!(
        ledger.get_account(player).await,
        Err(AccountError::AccountNotFound(_))
    ));
    assert_eq!(ledger.balance(player).await.unwrap(), 500);

    let fee_key = format!("pg-test:{player}:fee");
    assert_eq!(
        ledger.debit(player, 200, EntryType::EntryFee, &fee_key).await.unwrap(),
        300
    );
    assert_eq!(
        ledger
            .credit(player, 50, EntryType::Refund, &format!("pg-test:{player}:refund"))
            .await
            .unwrap(),
        350
    );
    assert!(ledger.entry_applied(&fee_key).await.unwrap());

    let account = ledger.get_account(player).await.unwrap();
    assert_eq!(account.coins, 350);
    assert_eq!(account.tournaments_won, 0);

    let entries = ledger.get_entries(player, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].entry_type, EntryType::Refund);
    assert_eq!(entries[0].direction, EntryDirection::Credit);
    assert_eq!(entries[1].direction, EntryDirection::Debit);
    assert_eq!(entries[1].amount, -200);
    assert_eq!(entries[1].balance_after, 300);

    assert!(matches!(
        ledger.debit(player, 10, EntryType::EntryFee, &fee_key).await,
        Err(AccountError::DuplicateTransaction(_))
    ));
    assert!(matches!(
        ledger
            .debit(player, 351, EntryType::EntryFee, &format!("pg-test:{player}:big"))
            .await,
        Err(AccountError::InsufficientBalance { available: 350, .. })
    ));
    assert_eq!(ledger.balance(player).await.unwrap(), 350);
}

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_debits_never_overdraw() {
    let ledger = PgAccountLedger::new(setup_test_db().await, 100);
    let player = fresh_player();

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .debit(player, 30, EntryType::EntryFee, &format!("pg-test:{player}:race:{i}"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AccountError::InsufficientBalance { .. }) => {}
            Err(e) => panic!("unexpected ledger error: {e}"),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(ledger.balance(player).await.unwrap(), 10);
    assert_eq!(ledger.get_entries(player, 20).await.unwrap().len(), 3);
}

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_award_and_revoke_prizes() {
    let ledger = PgAccountLedger::new(setup_test_db().await, 0);
    let (champion, runner_up) = (fresh_player(), fresh_player());
    let credits = vec![
        prize(champion, 60, true, &format!("pg-test:{champion}:prize")),
        prize(runner_up, 0, false, &format!("pg-test:{runner_up}:prize")),
    ];

    ledger.award_prizes(&credits).await.unwrap();
    ledger.award_prizes(&credits).await.unwrap();

    let account = ledger.get_account(champion).await.unwrap();
    assert_eq!((account.coins, account.tournaments_won), (60, 1));
    // Zero prizes still claim their key
    assert!(ledger.entry_applied(&credits[1].idempotency_key).await.unwrap());
    assert_eq!(ledger.get_entries(runner_up, 10).await.unwrap().len(), 1);

    ledger.revoke_prizes(&credits).await.unwrap();
    ledger.revoke_prizes(&credits).await.unwrap();

    let account = ledger.get_account(champion).await.unwrap();
    assert_eq!((account.coins, account.tournaments_won), (0, 0));
    let entries = ledger.get_entries(champion, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].direction, EntryDirection::Debit);
    assert!(entries[0].idempotency_key.ends_with(":reversal"));
}

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_revoke_rolls_back_on_shortfall() {
    let ledger = PgAccountLedger::new(setup_test_db().await, 0);
    let (champion, runner_up) = (fresh_player(), fresh_player());
    let credits = vec![
        prize(champion, 60, true, &format!("pg-test:{champion}:prize")),
        prize(runner_up, 40, false, &format!("pg-test:{runner_up}:prize")),
    ];
    ledger.award_prizes(&credits).await.unwrap();
    ledger
        .debit(runner_up, 30, EntryType::EntryFee, &format!("pg-test:{runner_up}:spent"))
        .await
        .unwrap();

    assert!(matches!(
        ledger.revoke_prizes(&credits).await,
        Err(AccountError::InsufficientBalance { .. })
    ));

    let account = ledger.get_account(champion).await.unwrap();
    assert_eq!((account.coins, account.tournaments_won), (60, 1));
    assert!(
        !ledger
            .entry_applied(&format!("pg-test:{champion}:prize:reversal"))
            .await
            .unwrap()
    );
}

// ============================================================================
// Full Flow
// ============================================================================

#[tokio::test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_tournament_over_postgres() {
    let pool = setup_test_db().await;
    let ledger = Arc::new(PgAccountLedger::new(pool.clone(), 1000));
    let manager = TournamentManager::new(
        Arc::new(PgTournamentStore::new(pool)),
        ledger.clone(),
        Arc::new(EventHub::default()),
        CoordinatorSettings {
            seeding: Seeding::JoinOrder,
            ..CoordinatorSettings::default()
        },
    );
    let players: Vec<PlayerId> = (0..4).map(|_| fresh_player()).collect();

    let config = TournamentConfig::single_elimination("Postgres Cup", 4, 100);
    let tournament = manager.create(config, players[0]).await.unwrap();
    for &player in &players[1..] {
        manager.join(tournament.id, player).await.unwrap();
    }
    manager.start(tournament.id, players[0]).await.unwrap();

    manager.complete_match(tournament.id, 0, 0, players[0]).await.unwrap();
    manager.complete_match(tournament.id, 0, 1, players[3]).await.unwrap();
    let done = manager.complete_match(tournament.id, 1, 0, players[3]).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);

    let results = manager.results(tournament.id).await.unwrap();
    assert_eq!(results.results[0].player_id, players[3]);
    for award in &results.results {
        let account = ledger.get_account(award.player_id).await.unwrap();
        assert_eq!(account.coins, 900 + award.prize);
        assert_eq!(account.tournaments_won, i32::from(award.position == 1));
    }

    let history = manager.tournaments_for_player(players[2]).await.unwrap();
    assert_eq!(history[0].id, tournament.id);
}
