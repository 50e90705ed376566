//! Real-time tournament events.
//!
//! The coordinator publishes fire-and-forget events to topics; transports
//! (the WebSocket layer in the server) subscribe and filter by topic.

use crate::tournament::{
    Bracket, PlayerId, PrizeAward, RaceSettings, Tournament, TournamentId, TournamentSummary,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Where an event is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "topic", content = "id", rename_all = "snake_case")]
pub enum Topic {
    /// Lobby listing of open tournaments
    TournamentList,
    /// Everything about one tournament
    Tournament(TournamentId),
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TournamentEvent {
    TournamentList {
        tournaments: Vec<TournamentSummary>,
    },
    TournamentUpdate {
        tournament: Box<Tournament>,
    },
    BracketUpdate {
        tournament_id: TournamentId,
        current_round: u32,
        bracket: Bracket,
    },
    /// A match was launched; the race room should open `game_id`
    MatchStart {
        tournament_id: TournamentId,
        round: u32,
        match_index: u32,
        player1: PlayerId,
        player2: PlayerId,
        game_id: String,
        settings: RaceSettings,
    },
    TournamentCompleted {
        tournament_id: TournamentId,
        champion: PlayerId,
        results: Vec<PrizeAward>,
    },
    TournamentCancelled {
        tournament_id: TournamentId,
    },
}

/// An event addressed to a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    pub event: TournamentEvent,
}

/// Outbound pub/sub channel. Publishing never fails and never blocks.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, topic: Topic, event: TournamentEvent);
}

/// Broadcast hub backed by `tokio::sync::broadcast`
///
/// Slow subscribers lag and miss events rather than holding up the
/// coordinator.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for EventHub {
    fn publish(&self, topic: Topic, event: TournamentEvent) {
        // Err only means nobody is listening
        if self.sender.send(Arc::new(Envelope { topic, event })).is_err() {
            log::trace!("No subscribers for {:?}", topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_hub_delivers_to_every_subscriber() {
        let hub = EventHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let id = Uuid::new_v4();
        hub.publish(Topic::Tournament(id), TournamentEvent::TournamentCancelled { tournament_id: id });

        for rx in [&mut a, &mut b] {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.topic, Topic::Tournament(id));
            assert_eq!(
                envelope.event,
                TournamentEvent::TournamentCancelled { tournament_id: id }
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let hub = EventHub::default();
        hub.publish(
            Topic::TournamentList,
            TournamentEvent::TournamentList { tournaments: vec![] },
        );
    }

    #[test]
    fn test_event_wire_format() {
        let id = Uuid::nil();
        let json = serde_json::to_value(TournamentEvent::TournamentCancelled { tournament_id: id }).unwrap();
        assert_eq!(json["type"], "tournament_cancelled");
        assert_eq!(json["tournament_id"], id.to_string());

        let topic = serde_json::to_value(Topic::Tournament(id)).unwrap();
        assert_eq!(topic["topic"], "tournament");
    }
}
