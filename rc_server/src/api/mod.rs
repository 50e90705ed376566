//! HTTP/WebSocket API for the tournament server.
//!
//! # Modules
//!
//! - [`auth`]: Player token verification
//! - [`extract`]: Body and path extractors with JSON error bodies
//! - [`middleware`]: Authentication middleware for protected endpoints
//! - [`tournaments`]: Tournament REST handlers
//! - [`websocket`]: Live event streams
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                                               - Health check
//! GET  /api/v1/tournaments                                   - Open tournaments (public)
//! GET  /api/v1/tournaments/{id}                              - Tournament (public)
//! GET  /api/v1/tournaments/{id}/bracket                      - Bracket (public)
//! GET  /api/v1/tournaments/{id}/results                      - Prize results (public)
//! GET  /api/v1/tournaments/user/{player_id}                  - Player's tournaments (public)
//! POST /api/v1/tournaments                                   - Create (auth required)
//! POST /api/v1/tournaments/{id}/join                         - Join (auth required)
//! POST /api/v1/tournaments/{id}/leave                        - Leave (auth required)
//! POST /api/v1/tournaments/{id}/start                        - Start (auth required)
//! POST /api/v1/tournaments/{id}/matches/{round}/{index}/complete - Report winner (auth required)
//! GET  /ws/tournaments                                       - Lobby event stream
//! GET  /ws/tournaments/{id}                                  - Tournament event stream
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively; put the server behind a proxy that
//! restricts origins in production.

pub mod auth;
pub mod extract;
pub mod middleware;
pub mod tournaments;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use race_cup::{db::Database, events::EventHub, tournament::TournamentManager};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use auth::TokenVerifier;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub manager: TournamentManager,
    pub hub: EventHub,
    pub verifier: Arc<TokenVerifier>,
    /// Connection pool of the postgres backend, checked by `/health`
    pub database: Option<Database>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use rc_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:7070").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    let root_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ws/tournaments", get(websocket::list_socket))
        .route("/ws/tournaments/{id}", get(websocket::tournament_socket));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", v1_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/tournaments", get(tournaments::list_tournaments))
        .route("/tournaments/{id}", get(tournaments::get_tournament))
        .route("/tournaments/{id}/bracket", get(tournaments::get_bracket))
        .route("/tournaments/{id}/results", get(tournaments::get_results))
        .route(
            "/tournaments/user/{player_id}",
            get(tournaments::player_tournaments),
        );

    let protected_routes = Router::new()
        .route("/tournaments", post(tournaments::create_tournament))
        .route("/tournaments/{id}/join", post(tournaments::join_tournament))
        .route("/tournaments/{id}/leave", post(tournaments::leave_tournament))
        .route("/tournaments/{id}/start", post(tournaments::start_tournament))
        .route(
            "/tournaments/{id}/matches/{round}/{match_index}/complete",
            post(tournaments::complete_match),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `503 Service Unavailable` when the tournament store cannot be read
/// or the database does not answer.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.manager.list_open().await.is_ok();
    let database_healthy = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };
    let healthy = store_healthy && database_healthy != Some(false);

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "database": database_healthy,
        "tournaments": {
            "active_actors": state.manager.active_actor_count().await,
            "subscribers": state.hub.subscriber_count(),
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
