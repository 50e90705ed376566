//! Tournament persistence.
//!
//! A tournament is saved as one document so that every mutation is a single
//! atomic write. Postgres keeps the document in a JSONB column next to the
//! few scalar columns used for filtering.

use crate::tournament::{PlayerId, Tournament, TournamentId, TournamentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, types::Json};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable tournament storage
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Load a tournament, `None` if it does not exist
    async fn load(&self, id: TournamentId) -> StoreResult<Option<Tournament>>;

    /// Insert or replace a tournament
    async fn save(&self, tournament: &Tournament) -> StoreResult<()>;

    /// Remove a tournament; removing a missing one is not an error
    async fn delete(&self, id: TournamentId) -> StoreResult<()>;

    /// Tournaments in any of `statuses`, newest first
    async fn list(&self, statuses: &[TournamentStatus]) -> StoreResult<Vec<Tournament>>;

    /// Tournaments a player has joined, newest first
    async fn list_for_player(&self, player_id: PlayerId) -> StoreResult<Vec<Tournament>>;

    /// Delete terminal tournaments finished before `cutoff`. Returns how many were removed.
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

fn newest_first(mut tournaments: Vec<Tournament>) -> Vec<Tournament> {
    tournaments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    tournaments
}

/// In-process store
#[derive(Default)]
pub struct MemoryTournamentStore {
    tournaments: RwLock<HashMap<TournamentId, Tournament>>,
}

impl MemoryTournamentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tournaments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tournaments.read().await.is_empty()
    }
}

#[async_trait]
impl TournamentStore for MemoryTournamentStore {
    async fn load(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        Ok(self.tournaments.read().await.get(&id).cloned())
    }

    async fn save(&self, tournament: &Tournament) -> StoreResult<()> {
        self.tournaments
            .write()
            .await
            .insert(tournament.id, tournament.clone());
        Ok(())
    }

    async fn delete(&self, id: TournamentId) -> StoreResult<()> {
        self.tournaments.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self, statuses: &[TournamentStatus]) -> StoreResult<Vec<Tournament>> {
        let tournaments = self.tournaments.read().await;
        Ok(newest_first(
            tournaments
                .values()
                .filter(|t| statuses.contains(&t.status))
                .cloned()
                .collect(),
        ))
    }

    async fn list_for_player(&self, player_id: PlayerId) -> StoreResult<Vec<Tournament>> {
        let tournaments = self.tournaments.read().await;
        Ok(newest_first(
            tournaments
                .values()
                .filter(|t| t.has_player(player_id))
                .cloned()
                .collect(),
        ))
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tournaments = self.tournaments.write().await;
        let before = tournaments.len();
        tournaments.retain(|_, t| {
            !(t.status.is_terminal() && t.completed_at.is_some_and(|done| done < cutoff))
        });
        Ok((before - tournaments.len()) as u64)
    }
}

/// Postgres store using the `tournaments` and `tournament_players` tables
#[derive(Clone)]
pub struct PgTournamentStore {
    pool: Arc<PgPool>,
}

impl PgTournamentStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn decode(rows: Vec<sqlx::postgres::PgRow>) -> StoreResult<Vec<Tournament>> {
        rows.into_iter()
            .map(|row| {
                let Json(tournament): Json<Tournament> = row.try_get("document")?;
                Ok(tournament)
            })
            .collect()
    }
}

#[async_trait]
impl TournamentStore for PgTournamentStore {
    async fn load(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        let row = sqlx::query("SELECT document FROM tournaments WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        match row {
            Some(row) => {
                let Json(tournament): Json<Tournament> = row.try_get("document")?;
                Ok(Some(tournament))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, tournament: &Tournament) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tournaments (id, status, document, completed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET
                status = EXCLUDED.status,
                document = EXCLUDED.document,
                completed_at = EXCLUDED.completed_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tournament.id)
        .bind(tournament.status.as_str())
        .bind(Json(tournament))
        .bind(tournament.completed_at.map(|t| t.naive_utc()))
        .bind(tournament.updated_at.naive_utc())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tournament_players WHERE tournament_id = $1")
            .bind(tournament.id)
            .execute(&mut *tx)
            .await?;

        let player_ids = tournament.player_ids();
        if !player_ids.is_empty() {
            sqlx::query(
                "INSERT INTO tournament_players (tournament_id, player_id)
                 SELECT $1, UNNEST($2::BIGINT[])",
            )
            .bind(tournament.id)
            .bind(&player_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: TournamentId) -> StoreResult<()> {
        sqlx::query("DELETE FROM tournaments WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn list(&self, statuses: &[TournamentStatus]) -> StoreResult<Vec<Tournament>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(
            "SELECT document FROM tournaments
             WHERE status = ANY($1)
             ORDER BY (document->>'created_at')::TIMESTAMPTZ DESC",
        )
        .bind(&statuses)
        .fetch_all(self.pool.as_ref())
        .await?;

        Self::decode(rows)
    }

    async fn list_for_player(&self, player_id: PlayerId) -> StoreResult<Vec<Tournament>> {
        let rows = sqlx::query(
            "SELECT t.document FROM tournaments t
             JOIN tournament_players tp ON tp.tournament_id = t.id
             WHERE tp.player_id = $1
             ORDER BY (t.document->>'created_at')::TIMESTAMPTZ DESC",
        )
        .bind(player_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Self::decode(rows)
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM tournaments
             WHERE status IN ('completed', 'cancelled') AND completed_at < $1",
        )
        .bind(cutoff.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::TournamentConfig;
    use chrono::Duration;

    fn tournament(name: &str, created_at: DateTime<Utc>) -> Tournament {
        Tournament::new(TournamentConfig::single_elimination(name, 4, 10), 1, created_at).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_round_trip_and_filters() {
        let store = MemoryTournamentStore::new();
        assert!(store.is_empty().await);
        let now = Utc::now();

        let mut older = tournament("Older Cup", now - Duration::minutes(5));
        older.add_player(7, now).unwrap();
        let newer = tournament("Newer Cup", now);
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        assert_eq!(store.load(older.id).await.unwrap(), Some(older.clone()));

        let waiting = store.list(&[TournamentStatus::Waiting]).await.unwrap();
        assert_eq!(
            waiting.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );
        assert!(store.list(&[TournamentStatus::Active]).await.unwrap().is_empty());

        let mine = store.list_for_player(7).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, older.id);

        store.delete(newer.id).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_retention() {
        let store = MemoryTournamentStore::new();
        let now = Utc::now();

        let mut stale = tournament("Stale Cup", now - Duration::days(10));
        stale.status = TournamentStatus::Completed;
        stale.completed_at = Some(now - Duration::days(8));

        let mut fresh = tournament("Fresh Cup", now - Duration::days(2));
        fresh.status = TournamentStatus::Completed;
        fresh.completed_at = Some(now - Duration::days(1));

        let open = tournament("Open Cup", now - Duration::days(30));

        for t in [&stale, &fresh, &open] {
            store.save(t).await.unwrap();
        }

        let removed = store
            .delete_finished_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(stale.id).await.unwrap().is_none());
        assert!(store.load(fresh.id).await.unwrap().is_some());
        assert!(store.load(open.id).await.unwrap().is_some());
    }
}
