use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use shared_types::ErrorBody;
use tracing::{error, warn};

use crate::{auth::AuthError, AppState};

/// Middleware: require a valid participant auth key.
/// On success the resolved `AuthorizedParticipant` is placed in the request
/// extensions for the handlers.
pub async fn require_auth_key(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    match state.authorizer.authorize(&key).await {
        Ok(participant) => {
            req.extensions_mut().insert(participant);
            next.run(req).await
        }
        Err(AuthError::Backend(e)) => {
            error!("auth key lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("authorization backend unavailable")),
            )
                .into_response()
        }
        Err(e) => {
            warn!(path = %req.uri().path(), "rejected request: {e}");
            (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("unauthorized"))).into_response()
        }
    }
}
