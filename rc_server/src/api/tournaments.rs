//! Tournament API handlers.
//!
//! Listing, bracket and result endpoints are public. Creating, joining,
//! leaving, starting and reporting match results need a player token.
//!
//! # Examples
//!
//! Create a tournament:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/tournaments \
//!   -H "Authorization: Bearer TOKEN" \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Sunday Cup", "max_players": 8, "entry_fee": 100}'
//! ```
//!
//! Report a match winner:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/tournaments/ID/matches/0/1/complete \
//!   -H "Authorization: Bearer TOKEN" \
//!   -H "Content-Type: application/json" \
//!   -d '{"winner_id": 42}'
//! ```

use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use race_cup::tournament::{
    BracketView, ErrorKind, PlayerId, Tournament, TournamentConfig, TournamentError, TournamentId,
    TournamentResults, TournamentSummary,
};
use serde::{Deserialize, Serialize};

use super::{
    AppState,
    extract::{ApiJson, ApiPath},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteMatchRequest {
    pub winner_id: PlayerId,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
}

/// Error rendered as an HTTP response
#[derive(Debug)]
pub enum ApiError {
    Tournament(TournamentError),
    /// Body or path that could not be parsed
    BadRequest(String),
}

impl From<TournamentError> for ApiError {
    fn from(error: TournamentError) -> Self {
        ApiError::Tournament(error)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::ExternalDependency => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::Tournament(error) => {
                let kind = error.kind();
                if kind == ErrorKind::ExternalDependency {
                    tracing::error!("Tournament request failed: {}", error);
                }
                ErrorResponse {
                    kind,
                    error: error.client_message(),
                }
            }
            ApiError::BadRequest(error) => ErrorResponse {
                kind: ErrorKind::Validation,
                error,
            },
        };
        (status_for(body.kind), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// List waiting and active tournaments, newest first
pub async fn list_tournaments(State(state): State<AppState>) -> ApiResult<Vec<TournamentSummary>> {
    Ok(Json(state.manager.list_open().await?))
}

pub async fn get_tournament(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TournamentId>,
) -> ApiResult<Tournament> {
    Ok(Json(state.manager.get(id).await?))
}

pub async fn get_bracket(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TournamentId>,
) -> ApiResult<BracketView> {
    Ok(Json(state.manager.bracket(id).await?))
}

/// Prize distribution; `409 Conflict` until the tournament is completed
pub async fn get_results(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TournamentId>,
) -> ApiResult<TournamentResults> {
    Ok(Json(state.manager.results(id).await?))
}

/// Tournaments a player has entered, newest first
pub async fn player_tournaments(
    State(state): State<AppState>,
    ApiPath(player_id): ApiPath<PlayerId>,
) -> ApiResult<Vec<TournamentSummary>> {
    Ok(Json(state.manager.tournaments_for_player(player_id).await?))
}

/// Create a tournament; the caller pays the entry fee and joins it.
///
/// # Response
///
/// `201 Created` with the new tournament.
pub async fn create_tournament(
    State(state): State<AppState>,
    Extension(player_id): Extension<PlayerId>,
    ApiJson(config): ApiJson<TournamentConfig>,
) -> Result<(StatusCode, Json<Tournament>), ApiError> {
    let tournament = state.manager.create(config, player_id).await?;
    Ok((StatusCode::CREATED, Json(tournament)))
}

pub async fn join_tournament(
    State(state): State<AppState>,
    Extension(player_id): Extension<PlayerId>,
    ApiPath(id): ApiPath<TournamentId>,
) -> ApiResult<Tournament> {
    Ok(Json(state.manager.join(id, player_id).await?))
}

pub async fn leave_tournament(
    State(state): State<AppState>,
    Extension(player_id): Extension<PlayerId>,
    ApiPath(id): ApiPath<TournamentId>,
) -> ApiResult<Tournament> {
    Ok(Json(state.manager.leave(id, player_id).await?))
}

pub async fn start_tournament(
    State(state): State<AppState>,
    Extension(player_id): Extension<PlayerId>,
    ApiPath(id): ApiPath<TournamentId>,
) -> ApiResult<Tournament> {
    Ok(Json(state.manager.start(id, player_id).await?))
}

/// Record a match winner reported by the race room
pub async fn complete_match(
    State(state): State<AppState>,
    Extension(reporter): Extension<PlayerId>,
    ApiPath((id, round, match_index)): ApiPath<(TournamentId, u32, u32)>,
    ApiJson(request): ApiJson<CompleteMatchRequest>,
) -> ApiResult<Tournament> {
    tracing::debug!(
        "Player {} reports {} won match {}-{} of {}",
        reporter,
        request.winner_id,
        round,
        match_index,
        id
    );
    let tournament = state
        .manager
        .complete_match(id, round, match_index, request.winner_id)
        .await?;
    Ok(Json(tournament))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::StateConflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::InsufficientFunds),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(ErrorKind::ExternalDependency),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_response_hides_storage_details() {
        let error = TournamentError::Store(race_cup::db::StoreError::Unavailable(
            "password authentication failed".into(),
        ));
        let response = ApiError::Tournament(error).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_bad_request_is_validation() {
        let response = ApiError::BadRequest("missing field `name`".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
