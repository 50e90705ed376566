//! Tournament manager: entry point for every tournament operation.

use super::{
    actor::{Registry, Services, TournamentActor, TournamentHandle},
    bracket::{Match, MatchKey},
    config::CoordinatorSettings,
    errors::{TournamentError, TournamentResult},
    messages::{Reply, TournamentMessage},
    models::{PlayerId, Tournament, TournamentConfig, TournamentId, TournamentStatus, TournamentSummary},
    prizes::PrizeAward,
};
use crate::{accounts::AccountLedger, db::TournamentStore, events::EventPublisher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, oneshot};

/// Bracket snapshot for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketView {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub num_rounds: u32,
    pub matches: Vec<Match>,
}

/// Final standings of a completed tournament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentResults {
    pub tournament_id: TournamentId,
    pub prize_pool: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<PrizeAward>,
}

/// Tournament manager
///
/// Writes are routed to one actor per tournament, spawned on demand and
/// dropped once the tournament is finished. Reads go straight to the store.
#[derive(Clone)]
pub struct TournamentManager {
    services: Services,
    actors: Registry,
}

impl TournamentManager {
    pub fn new(
        store: Arc<dyn TournamentStore>,
        ledger: Arc<dyn AccountLedger>,
        events: Arc<dyn EventPublisher>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            services: Services {
                store,
                ledger,
                events,
                settings,
            },
            actors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.services.settings
    }

    /// Create a tournament. The creator pays the entry fee and is its first player.
    ///
    /// # Errors
    ///
    /// * Validation errors for a bad config
    /// * `TournamentError::InsufficientFunds` - creator cannot pay the entry fee
    pub async fn create(
        &self,
        config: TournamentConfig,
        creator: PlayerId,
    ) -> TournamentResult<Tournament> {
        let services = &self.services;
        let mut tournament = Tournament::new(config, creator, Utc::now())?;

        let key = services.debit_entry(&tournament, creator).await?;

        tournament.add_player(creator, Utc::now())?;
        if let Err(e) = services.save(&tournament).await {
            services.reverse_entry(&tournament, creator, &key).await;
            return Err(e);
        }

        log::info!(
            "Tournament {} '{}' created by player {} ({} players, entry fee {})",
            tournament.id,
            tournament.name,
            creator,
            tournament.max_players,
            tournament.entry_fee
        );

        services.publish_state(&tournament);
        services.publish_list().await;
        Ok(tournament)
    }

    /// Join a waiting tournament, paying the entry fee
    pub async fn join(&self, id: TournamentId, player_id: PlayerId) -> TournamentResult<Tournament> {
        self.request(id, |response| TournamentMessage::Join {
            player_id,
            response,
        })
        .await
    }

    /// Leave a waiting tournament and get the entry fee back.
    ///
    /// The last player leaving cancels and deletes the tournament.
    pub async fn leave(&self, id: TournamentId, player_id: PlayerId) -> TournamentResult<Tournament> {
        self.request(id, |response| TournamentMessage::Leave {
            player_id,
            response,
        })
        .await
    }

    /// Start a tournament; only its creator may
    pub async fn start(&self, id: TournamentId, caller: PlayerId) -> TournamentResult<Tournament> {
        self.request(id, |response| TournamentMessage::Start { caller, response })
            .await
    }

    /// Report the winner of a match
    pub async fn complete_match(
        &self,
        id: TournamentId,
        round: u32,
        match_index: u32,
        winner: PlayerId,
    ) -> TournamentResult<Tournament> {
        let key = MatchKey::new(round, match_index);
        self.request(id, |response| TournamentMessage::CompleteMatch {
            key,
            winner,
            response,
        })
        .await
    }

    pub async fn get(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.services.load(id).await
    }

    /// Waiting and active tournaments, newest first
    pub async fn list_open(&self) -> TournamentResult<Vec<TournamentSummary>> {
        let open = [TournamentStatus::Waiting, TournamentStatus::Active];
        let tournaments = self
            .services
            .bounded("tournament store", self.services.store.list(&open))
            .await?;
        Ok(tournaments.iter().map(Tournament::summary).collect())
    }

    pub async fn bracket(&self, id: TournamentId) -> TournamentResult<BracketView> {
        let tournament = self.services.load(id).await?;
        Ok(BracketView {
            tournament_id: tournament.id,
            status: tournament.status,
            current_round: tournament.current_round,
            num_rounds: tournament.bracket.num_rounds(),
            matches: tournament.bracket.matches().to_vec(),
        })
    }

    /// Prize distribution sorted by position; only for completed tournaments
    pub async fn results(&self, id: TournamentId) -> TournamentResult<TournamentResults> {
        let tournament = self.services.load(id).await?;
        tournament.ensure_status(TournamentStatus::Completed)?;

        Ok(TournamentResults {
            tournament_id: tournament.id,
            prize_pool: tournament.prize_pool,
            completed_at: tournament.completed_at,
            results: tournament.prize_distribution(),
        })
    }

    pub async fn tournaments_for_player(
        &self,
        player_id: PlayerId,
    ) -> TournamentResult<Vec<TournamentSummary>> {
        let tournaments = self
            .services
            .bounded(
                "tournament store",
                self.services.store.list_for_player(player_id),
            )
            .await?;
        Ok(tournaments.iter().map(Tournament::summary).collect())
    }

    /// Delete finished tournaments older than the retention window
    pub async fn cleanup_completed(&self) -> TournamentResult<u64> {
        let cutoff = Utc::now() - self.services.settings.retention;
        let removed = self
            .services
            .bounded(
                "tournament store",
                self.services.store.delete_finished_before(cutoff),
            )
            .await?;

        if removed > 0 {
            log::info!("Removed {} finished tournaments", removed);
        }
        Ok(removed)
    }

    /// Number of tournaments with a running actor
    pub async fn active_actor_count(&self) -> usize {
        self.actors.read().await.len()
    }

    /// Send a request to the tournament's actor and wait for the reply.
    ///
    /// An actor that shut down between lookup and delivery is replaced once.
    async fn request<F>(&self, id: TournamentId, message: F) -> TournamentResult<Tournament>
    where
        F: Fn(Reply) -> TournamentMessage,
    {
        for _ in 0..2 {
            let handle = self.handle_for(id).await;
            let (tx, rx) = oneshot::channel();

            if handle.send(message(tx)).await.is_err() {
                self.forget(&handle).await;
                continue;
            }

            match rx.await {
                Ok(Err(TournamentError::Unavailable(_))) | Err(_) => {
                    self.forget(&handle).await;
                }
                Ok(result) => return result,
            }
        }

        Err(TournamentError::Unavailable(id))
    }

    async fn handle_for(&self, id: TournamentId) -> TournamentHandle {
        if let Some(handle) = self.actors.read().await.get(&id)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        let mut actors = self.actors.write().await;
        if let Some(handle) = actors.get(&id)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        let (actor, handle) = TournamentActor::new(id, self.services.clone(), self.actors.clone());
        actors.insert(id, handle.clone());
        tokio::spawn(actor.run());

        handle
    }

    async fn forget(&self, handle: &TournamentHandle) {
        let mut actors = self.actors.write().await;
        if actors
            .get(&handle.tournament_id())
            .is_some_and(|h| h.same_actor(handle))
        {
            actors.remove(&handle.tournament_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accounts::MemoryAccountLedger, db::MemoryTournamentStore, events::EventHub,
        tournament::Seeding,
    };

    fn manager() -> (TournamentManager, Arc<MemoryAccountLedger>) {
        let ledger = Arc::new(MemoryAccountLedger::new(1000));
        let manager = TournamentManager::new(
            Arc::new(MemoryTournamentStore::new()),
            ledger.clone(),
            Arc::new(EventHub::default()),
            CoordinatorSettings {
                seeding: Seeding::JoinOrder,
                ..CoordinatorSettings::default()
            },
        );
        (manager, ledger)
    }

    #[tokio::test]
    async fn test_create_charges_creator() {
        let (manager, ledger) = manager();
        let tournament = manager
            .create(TournamentConfig::single_elimination("Sunday Cup", 4, 100), 1)
            .await
            .unwrap();

        assert_eq!(tournament.player_ids(), vec![1]);
        assert_eq!(tournament.prize_pool, 400);
        assert_eq!(ledger.balance(1).await.unwrap(), 900);
        assert_eq!(manager.get(tournament.id).await.unwrap(), tournament);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_config_without_charging() {
        let (manager, ledger) = manager();
        let result = manager
            .create(TournamentConfig::single_elimination("No", 4, 100), 1)
            .await;
        assert!(matches!(result, Err(TournamentError::InvalidName(_))));
        assert_eq!(ledger.balance(1).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_unknown_tournament() {
        let (manager, _) = manager();
        let id = uuid::Uuid::new_v4();
        assert!(matches!(
            manager.join(id, 2).await,
            Err(TournamentError::NotFound(found)) if found == id
        ));
        assert!(matches!(manager.get(id).await, Err(TournamentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_results_only_after_completion() {
        let (manager, _) = manager();
        let tournament = manager
            .create(TournamentConfig::single_elimination("Duel Cup", 2, 50), 1)
            .await
            .unwrap();
        manager.join(tournament.id, 2).await.unwrap();

        assert!(matches!(
            manager.results(tournament.id).await,
            Err(TournamentError::InvalidState { .. })
        ));

        manager.start(tournament.id, 1).await.unwrap();
        let done = manager.complete_match(tournament.id, 0, 0, 2).await.unwrap();
        assert_eq!(done.status, TournamentStatus::Completed);

        let results = manager.results(tournament.id).await.unwrap();
        assert_eq!(results.results[0].player_id, 2);
        assert_eq!(results.results[0].prize, 60);
        assert_eq!(results.results[1].prize, 40);
    }
}
