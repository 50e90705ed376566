//! Authentication middleware for protected endpoints.
//!
//! Handlers behind this layer read the caller with
//! `Extension(player_id): Extension<PlayerId>`.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use super::AppState;

/// Validate the `Authorization: Bearer <token>` header and inject the player id.
///
/// Missing, malformed, invalid or expired tokens get `401 Unauthorized`.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    match state.verifier.verify(token) {
        Ok(player_id) => {
            request.extensions_mut().insert(player_id);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!("Rejected access token: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
