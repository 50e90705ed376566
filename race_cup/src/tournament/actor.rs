//! Tournament actor: the single writer for one tournament.
//!
//! Every request is one load-mutate-save cycle against the store. The
//! tournament is mutated as a local copy, so a failed ledger or store call
//! simply drops the copy. Ledger movements already made are compensated
//! before the error is returned: a fee is refunded and a payout revoked.

use super::{
    advancer::{self, Advancement},
    bracket::{MatchKey, MatchStatus},
    config::CoordinatorSettings,
    errors::{TournamentError, TournamentResult},
    messages::TournamentMessage,
    models::{PlayerId, Tournament, TournamentId, TournamentStatus},
    prizes::PrizeCredit,
};
use crate::{
    accounts::{AccountLedger, EntryType, reversal_key},
    db::TournamentStore,
    events::{EventPublisher, Topic, TournamentEvent},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Collaborators shared by the manager and every actor
#[derive(Clone)]
pub(crate) struct Services {
    pub store: Arc<dyn TournamentStore>,
    pub ledger: Arc<dyn AccountLedger>,
    pub events: Arc<dyn EventPublisher>,
    pub settings: CoordinatorSettings,
}

impl Services {
    /// Await an external call, giving up after the configured timeout
    pub async fn bounded<T, E>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T, E>>,
    ) -> TournamentResult<T>
    where
        E: Into<TournamentError>,
    {
        match tokio::time::timeout(self.settings.external_timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                log::warn!("Timed out waiting for {}", what);
                Err(TournamentError::Timeout(what))
            }
        }
    }

    pub async fn load(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.bounded("tournament store", self.store.load(id))
            .await?
            .ok_or(TournamentError::NotFound(id))
    }

    /// Persist the tournament. A write that timed out may still have landed,
    /// so the stored copy is checked before the timeout is reported.
    pub async fn save(&self, tournament: &Tournament) -> TournamentResult<()> {
        match self
            .bounded("tournament store", self.store.save(tournament))
            .await
        {
            Err(TournamentError::Timeout(what)) => {
                let stored = self
                    .bounded("tournament store", self.store.load(tournament.id))
                    .await;
                if matches!(&stored, Ok(Some(stored)) if stored == tournament) {
                    log::warn!("Tournament {}: save timed out but was stored", tournament.id);
                    Ok(())
                } else {
                    Err(TournamentError::Timeout(what))
                }
            }
            other => other,
        }
    }

    /// Charge the entry fee, returning the ledger key used.
    ///
    /// A debit that timed out may still have committed; it is looked up and
    /// returned so the failed join leaves the balance untouched.
    pub async fn debit_entry(&self, tournament: &Tournament, player_id: PlayerId) -> TournamentResult<String> {
        let key = ledger_key(tournament.id, "entry", player_id);
        if tournament.entry_fee > 0 {
            let debited = self
                .bounded(
                    "account ledger",
                    self.ledger
                        .debit(player_id, tournament.entry_fee, EntryType::EntryFee, &key),
                )
                .await;
            if let Err(e) = debited {
                if matches!(e, TournamentError::Timeout(_)) && self.applied_late(&key).await {
                    self.reverse_entry(tournament, player_id, &key).await;
                }
                return Err(e);
            }
        }
        Ok(key)
    }

    /// Return the entry fee, returning the ledger key used
    pub async fn refund_entry(&self, tournament: &Tournament, player_id: PlayerId) -> TournamentResult<String> {
        let key = ledger_key(tournament.id, "refund", player_id);
        if tournament.entry_fee > 0 {
            let refunded = self
                .bounded(
                    "account ledger",
                    self.ledger
                        .credit(player_id, tournament.entry_fee, EntryType::Refund, &key),
                )
                .await;
            if let Err(e) = refunded {
                if matches!(e, TournamentError::Timeout(_)) && self.applied_late(&key).await {
                    self.reverse_refund(tournament, player_id, &key).await;
                }
                return Err(e);
            }
        }
        Ok(key)
    }

    /// Whether a ledger entry that timed out was recorded anyway
    async fn applied_late(&self, key: &str) -> bool {
        match self
            .bounded("account ledger", self.ledger.entry_applied(key))
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                log::error!("Cannot tell whether ledger entry {} was applied: {}", key, e);
                false
            }
        }
    }

    /// Undo the debit `key` for a change that could not be persisted
    pub async fn reverse_entry(&self, tournament: &Tournament, player_id: PlayerId, key: &str) {
        if tournament.entry_fee == 0 {
            return;
        }
        let result = self
            .bounded(
                "account ledger",
                self.ledger.credit(
                    player_id,
                    tournament.entry_fee,
                    EntryType::Refund,
                    &reversal_key(key),
                ),
            )
            .await;
        if let Err(e) = result {
            log::error!(
                "Tournament {}: failed to return entry fee to player {}: {}",
                tournament.id,
                player_id,
                e
            );
        }
    }

    /// Undo the refund `key` for a leave that could not be persisted
    async fn reverse_refund(&self, tournament: &Tournament, player_id: PlayerId, key: &str) {
        if tournament.entry_fee == 0 {
            return;
        }
        let result = self
            .bounded(
                "account ledger",
                self.ledger.debit(
                    player_id,
                    tournament.entry_fee,
                    EntryType::EntryFee,
                    &reversal_key(key),
                ),
            )
            .await;
        if let Err(e) = result {
            log::error!(
                "Tournament {}: failed to take back refund from player {}: {}",
                tournament.id,
                player_id,
                e
            );
        }
    }

    /// Pay the prizes of a finished tournament. A payout that timed out is
    /// revoked, so a failed completion never leaves coins behind.
    async fn pay_prizes(&self, tournament_id: TournamentId, credits: &[PrizeCredit]) -> TournamentResult<()> {
        let paid = self
            .bounded("account ledger", self.ledger.award_prizes(credits))
            .await;
        if let Err(e) = paid {
            if matches!(e, TournamentError::Timeout(_)) {
                self.revoke_prizes(tournament_id, credits).await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Take back a payout for a completion that could not be persisted
    async fn revoke_prizes(&self, tournament_id: TournamentId, credits: &[PrizeCredit]) {
        if credits.is_empty() {
            return;
        }
        let result = self
            .bounded("account ledger", self.ledger.revoke_prizes(credits))
            .await;
        if let Err(e) = result {
            log::error!(
                "Tournament {}: failed to revoke prizes: {}",
                tournament_id,
                e
            );
        }
    }

    /// Tournament and bracket snapshots for the tournament topic
    pub fn publish_state(&self, tournament: &Tournament) {
        let topic = Topic::Tournament(tournament.id);
        self.events.publish(
            topic,
            TournamentEvent::TournamentUpdate {
                tournament: Box::new(tournament.clone()),
            },
        );
        if !tournament.bracket.is_empty() {
            self.events.publish(
                topic,
                TournamentEvent::BracketUpdate {
                    tournament_id: tournament.id,
                    current_round: tournament.current_round,
                    bracket: tournament.bracket.clone(),
                },
            );
        }
    }

    /// Refresh the lobby listing
    pub async fn publish_list(&self) {
        let open = [TournamentStatus::Waiting, TournamentStatus::Active];
        match self.bounded("tournament store", self.store.list(&open)).await {
            Ok(tournaments) => self.events.publish(
                Topic::TournamentList,
                TournamentEvent::TournamentList {
                    tournaments: tournaments.iter().map(Tournament::summary).collect(),
                },
            ),
            Err(e) => log::warn!("Skipping tournament list refresh: {}", e),
        }
    }
}

/// Ledger idempotency key for one fee movement.
///
/// Unique per attempt; its reversal reuses it with a `:reversal` suffix, so a
/// compensation can never be applied twice.
fn ledger_key(tournament_id: TournamentId, movement: &str, player_id: PlayerId) -> String {
    format!(
        "tournament:{}:{}:{}:{}",
        tournament_id,
        movement,
        player_id,
        Uuid::new_v4().simple()
    )
}

/// Tournament handle for sending messages
#[derive(Clone, Debug)]
pub struct TournamentHandle {
    sender: mpsc::Sender<TournamentMessage>,
    tournament_id: TournamentId,
}

impl TournamentHandle {
    pub fn new(sender: mpsc::Sender<TournamentMessage>, tournament_id: TournamentId) -> Self {
        Self {
            sender,
            tournament_id,
        }
    }

    pub fn tournament_id(&self) -> TournamentId {
        self.tournament_id
    }

    /// The actor has stopped accepting messages
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn same_actor(&self, other: &TournamentHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Send a message to the actor
    pub async fn send(&self, message: TournamentMessage) -> TournamentResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TournamentError::Unavailable(self.tournament_id))
    }
}

pub(crate) type Registry = Arc<RwLock<HashMap<TournamentId, TournamentHandle>>>;

/// Actor serializing all writes to one tournament
pub struct TournamentActor {
    id: TournamentId,
    inbox: mpsc::Receiver<TournamentMessage>,
    services: Services,
    registry: Registry,
    handle: TournamentHandle,
}

impl TournamentActor {
    pub(crate) fn new(
        id: TournamentId,
        services: Services,
        registry: Registry,
    ) -> (Self, TournamentHandle) {
        let (sender, inbox) = mpsc::channel(services.settings.inbox_capacity.max(1));
        let handle = TournamentHandle::new(sender, id);

        let actor = Self {
            id,
            inbox,
            services,
            registry,
            handle: handle.clone(),
        };

        (actor, handle)
    }

    /// Run until the tournament is finished or gone
    pub async fn run(mut self) {
        log::debug!("Tournament {} actor starting", self.id);

        while let Some(message) = self.inbox.recv().await {
            if self.handle_message(message).await {
                break;
            }
        }

        // Refuse anything queued behind the final message; the manager
        // retries those against a fresh actor, which reloads the state.
        self.inbox.close();
        while let Ok(message) = self.inbox.try_recv() {
            let _ = message
                .into_response()
                .send(Err(TournamentError::Unavailable(self.id)));
        }

        let mut registry = self.registry.write().await;
        if registry
            .get(&self.id)
            .is_some_and(|h| h.same_actor(&self.handle))
        {
            registry.remove(&self.id);
        }

        log::debug!("Tournament {} actor stopped", self.id);
    }

    /// Handle one message; returns true when the actor should stop
    async fn handle_message(&mut self, message: TournamentMessage) -> bool {
        let (result, response) = match message {
            TournamentMessage::Join {
                player_id,
                response,
            } => (self.handle_join(player_id).await, response),

            TournamentMessage::Leave {
                player_id,
                response,
            } => (self.handle_leave(player_id).await, response),

            TournamentMessage::Start { caller, response } => {
                (self.handle_start(caller).await, response)
            }

            TournamentMessage::CompleteMatch {
                key,
                winner,
                response,
            } => (self.handle_complete(key, winner).await, response),
        };

        let stop = match &result {
            Ok(tournament) => tournament.status.is_terminal(),
            Err(TournamentError::NotFound(_)) => true,
            Err(TournamentError::InvalidState { actual, .. }) => actual.is_terminal(),
            Err(_) => false,
        };

        if let Err(e) = &result {
            log::debug!("Tournament {}: request rejected: {}", self.id, e);
        }

        let _ = response.send(result);
        stop
    }

    async fn handle_join(&mut self, player_id: PlayerId) -> TournamentResult<Tournament> {
        let services = &self.services;
        let mut tournament = services.load(self.id).await?;
        tournament.check_join(player_id)?;

        let key = services.debit_entry(&tournament, player_id).await?;

        tournament.add_player(player_id, Utc::now())?;
        if let Err(e) = services.save(&tournament).await {
            services.reverse_entry(&tournament, player_id, &key).await;
            return Err(e);
        }

        log::info!(
            "Player {} joined tournament {} ({}/{})",
            player_id,
            self.id,
            tournament.players.len(),
            tournament.max_players
        );

        services.publish_state(&tournament);
        services.publish_list().await;
        Ok(tournament)
    }

    async fn handle_leave(&mut self, player_id: PlayerId) -> TournamentResult<Tournament> {
        let services = &self.services;
        let mut tournament = services.load(self.id).await?;
        tournament.check_leave(player_id)?;

        let key = services.refund_entry(&tournament, player_id).await?;

        tournament.remove_player(player_id, Utc::now())?;
        let persisted = if tournament.status == TournamentStatus::Cancelled {
            services
                .bounded("tournament store", services.store.delete(self.id))
                .await
        } else {
            services.save(&tournament).await
        };

        if let Err(e) = persisted {
            services.reverse_refund(&tournament, player_id, &key).await;
            return Err(e);
        }

        log::info!("Player {} left tournament {}", player_id, self.id);

        if tournament.status == TournamentStatus::Cancelled {
            log::info!("Tournament {} cancelled: no players left", self.id);
            services.events.publish(
                Topic::Tournament(self.id),
                TournamentEvent::TournamentCancelled {
                    tournament_id: self.id,
                },
            );
        } else {
            services.publish_state(&tournament);
        }
        services.publish_list().await;
        Ok(tournament)
    }

    async fn handle_start(&mut self, caller: PlayerId) -> TournamentResult<Tournament> {
        let services = &self.services;
        let mut tournament = services.load(self.id).await?;
        tournament.ensure_status(TournamentStatus::Waiting)?;

        if caller != tournament.creator {
            return Err(TournamentError::NotCreator);
        }

        advancer::start(&mut tournament, services.settings.seeding, Utc::now())?;
        let launched = launch_ready_matches(&mut tournament);

        services.save(&tournament).await?;

        log::info!(
            "Tournament {} started with {} players, {} rounds",
            self.id,
            tournament.players.len(),
            tournament.bracket.num_rounds()
        );

        services.publish_state(&tournament);
        self.announce_launches(&tournament, &launched);
        services.publish_list().await;
        Ok(tournament)
    }

    async fn handle_complete(
        &mut self,
        key: MatchKey,
        winner: PlayerId,
    ) -> TournamentResult<Tournament> {
        let services = &self.services;
        let mut tournament = services.load(self.id).await?;

        let advancement = advancer::complete_match(&mut tournament, key, winner, Utc::now())?;

        // Prizes of an unsaved completion are revoked; a retry pays out
        // afresh under new keys for whichever winner is then reported.
        let credits = if advancement.tournament_completed() {
            let credits = PrizeCredit::for_awards(self.id, Uuid::new_v4(), &advancement.awards);
            services.pay_prizes(self.id, &credits).await?;
            credits
        } else {
            Vec::new()
        };

        let launched = launch_ready_matches(&mut tournament);
        if let Err(e) = services.save(&tournament).await {
            services.revoke_prizes(self.id, &credits).await;
            return Err(e);
        }

        log::info!(
            "Tournament {}: match {} won by player {}",
            self.id,
            key,
            winner
        );

        services.publish_state(&tournament);
        self.announce_launches(&tournament, &launched);
        self.announce_completion(&advancement);
        if advancement.round_advanced.is_some() || advancement.tournament_completed() {
            services.publish_list().await;
        }
        Ok(tournament)
    }

    fn announce_launches(&self, tournament: &Tournament, launched: &[MatchKey]) {
        for key in launched {
            let Some(game) = tournament.bracket.get(*key) else {
                continue;
            };
            let (Some(player1), Some(player2), Some(game_id)) =
                (game.player1, game.player2, game.game_id.clone())
            else {
                continue;
            };

            self.services.events.publish(
                Topic::Tournament(self.id),
                TournamentEvent::MatchStart {
                    tournament_id: self.id,
                    round: key.round,
                    match_index: key.match_index,
                    player1,
                    player2,
                    game_id,
                    settings: tournament.settings.clone(),
                },
            );
        }
    }

    fn announce_completion(&self, advancement: &Advancement) {
        if let Some(champion) = advancement.champion {
            self.services.events.publish(
                Topic::Tournament(self.id),
                TournamentEvent::TournamentCompleted {
                    tournament_id: self.id,
                    champion,
                    results: advancement.awards.clone(),
                },
            );
        }
    }
}

/// Mark every ready match of the current round Active with a fresh race room
fn launch_ready_matches(tournament: &mut Tournament) -> Vec<MatchKey> {
    let current_round = tournament.current_round;
    let mut launched = Vec::new();

    for game in tournament.bracket.matches_mut() {
        if game.round == current_round && game.is_ready() {
            game.status = MatchStatus::Active;
            game.game_id = Some(Uuid::new_v4().to_string());
            launched.push(game.key());
        }
    }

    launched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::{Seeding, TournamentConfig};

    #[test]
    fn test_launch_marks_ready_matches_active() {
        let now = Utc::now();
        let mut tournament =
            Tournament::new(TournamentConfig::single_elimination("Launch Cup", 4, 0), 1, now).unwrap();
        for p in 1..=4 {
            tournament.add_player(p, now).unwrap();
        }
        advancer::start(&mut tournament, Seeding::JoinOrder, now).unwrap();

        let launched = launch_ready_matches(&mut tournament);
        assert_eq!(launched, vec![MatchKey::new(0, 0), MatchKey::new(0, 1)]);
        for key in &launched {
            let game = tournament.bracket.get(*key).unwrap();
            assert_eq!(game.status, MatchStatus::Active);
            assert!(game.game_id.is_some());
        }

        // Already launched matches are not launched twice
        assert!(launch_ready_matches(&mut tournament).is_empty());
        // The final has no players yet
        assert_eq!(
            tournament.bracket.get(MatchKey::new(1, 0)).unwrap().status,
            MatchStatus::Pending
        );
    }

    #[test]
    fn test_ledger_keys_are_unique_per_attempt() {
        let id = Uuid::new_v4();
        let first = ledger_key(id, "entry", 2);
        let second = ledger_key(id, "entry", 2);
        assert_ne!(first, second);
        assert!(first.starts_with(&format!("tournament:{}:entry:2:", id)));
    }
}
