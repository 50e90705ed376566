//! WebSocket streams of tournament events.
//!
//! # Connection Flow
//!
//! 1. Client connects to `GET /ws/tournaments` (lobby) or
//!    `GET /ws/tournaments/{id}` (one tournament)
//! 2. Server sends a snapshot: the open tournament list, or the tournament
//! 3. Every event published to the topic afterwards is forwarded as JSON
//!
//! Streams are read-only; all writes go through the HTTP API.
//!
//! # Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:7070/ws/tournaments/ID');
//! ws.onmessage = (event) => {
//!   const data = JSON.parse(event.data);
//!   if (data.type === "match_start") {
//!     openRaceRoom(data.game_id, data.settings);
//!   }
//! };
//! ```

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use race_cup::{
    events::{Topic, TournamentEvent},
    tournament::TournamentId,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::{AppState, extract::ApiPath};

/// Subscribe to lobby updates
pub async fn list_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Topic::TournamentList, state))
}

/// Subscribe to one tournament's updates
pub async fn tournament_socket(
    ws: WebSocketUpgrade,
    ApiPath(id): ApiPath<TournamentId>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Topic::Tournament(id), state))
}

/// Current state sent right after connecting
async fn snapshot(topic: Topic, state: &AppState) -> Option<TournamentEvent> {
    match topic {
        Topic::TournamentList => match state.manager.list_open().await {
            Ok(tournaments) => Some(TournamentEvent::TournamentList { tournaments }),
            Err(e) => {
                warn!("No lobby snapshot: {}", e);
                None
            }
        },
        Topic::Tournament(id) => match state.manager.get(id).await {
            Ok(tournament) => Some(TournamentEvent::TournamentUpdate {
                tournament: Box::new(tournament),
            }),
            Err(e) => {
                debug!("No snapshot for tournament {}: {}", id, e);
                None
            }
        },
    }
}

fn encode(event: &TournamentEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, topic: Topic, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the snapshot so nothing published in between is lost
    let mut events = state.hub.subscribe();

    info!("WebSocket connected: {:?}", topic);

    if let Some(message) = snapshot(topic, &state).await.as_ref().and_then(encode)
        && sender.send(message).await.is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(envelope) => {
                    if envelope.topic != topic {
                        continue;
                    }
                    let Some(message) = encode(&envelope.event) else {
                        continue;
                    };
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket {:?} lagged, skipped {} events", topic, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                // Pings are answered by axum; anything else is ignored
                Some(Ok(_)) => {}
            },
        }
    }

    info!("WebSocket disconnected: {:?}", topic);
}
