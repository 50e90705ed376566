//! Tournament actor message types.

use super::{
    bracket::MatchKey,
    errors::TournamentResult,
    models::{PlayerId, Tournament},
};
use tokio::sync::oneshot;

/// Reply carrying the tournament snapshot after the change
pub type Reply = oneshot::Sender<TournamentResult<Tournament>>;

/// Messages that can be sent to a `TournamentActor`
#[derive(Debug)]
pub enum TournamentMessage {
    /// Pay the entry fee and take a seat
    Join { player_id: PlayerId, response: Reply },

    /// Give up a seat and get the entry fee back
    Leave { player_id: PlayerId, response: Reply },

    /// Lock membership and build the bracket
    Start { caller: PlayerId, response: Reply },

    /// Record a race result
    CompleteMatch {
        key: MatchKey,
        winner: PlayerId,
        response: Reply,
    },
}

impl TournamentMessage {
    /// Consume the message, returning its reply channel
    pub fn into_response(self) -> Reply {
        match self {
            TournamentMessage::Join { response, .. }
            | TournamentMessage::Leave { response, .. }
            | TournamentMessage::Start { response, .. }
            | TournamentMessage::CompleteMatch { response, .. } => response,
        }
    }
}
