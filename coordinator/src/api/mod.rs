//! HTTP boundary used by participant agents.
//!
//! Routes keep the paths the agents already poll. Every `/api` route runs
//! behind [`require_auth_key`], which resolves the caller to a participant
//! of exactly one study.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use shared_types::{ErrorBody, UsernameResponse};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::{
    auth::AuthorizedParticipant, engine::CoordinationError, middleware::require_auth_key,
    AppState,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/update_firestore", get(update_firestore))
        .route("/api/get_doc_ref_dict", get(get_doc_ref_dict))
        .route("/api/get_username", get(get_username))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth_key,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateQuery {
    pub msg: Option<String>,
}

/// GET /api/update_firestore?msg=<tag>::<key>=<value>
pub async fn update_firestore(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthorizedParticipant>,
    Query(query): Query<UpdateQuery>,
) -> Response {
    let Some(msg) = query.msg else {
        return coordination_error(CoordinationError::MalformedMessage(
            "missing msg parameter".to_string(),
        ));
    };

    match state
        .coordinator
        .handle_update(&user.study_id, &user.participant, &msg)
        .await
    {
        Ok(_) => Json(json!({})).into_response(),
        Err(e) => coordination_error(e),
    }
}

/// GET /api/get_doc_ref_dict — the caller's full study record
pub async fn get_doc_ref_dict(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthorizedParticipant>,
) -> Response {
    match state.store.get(&user.study_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => coordination_error(e.into()),
    }
}

/// GET /api/get_username
pub async fn get_username(Extension(user): Extension<AuthorizedParticipant>) -> impl IntoResponse {
    Json(UsernameResponse {
        username: user.participant,
    })
}

fn coordination_error(e: CoordinationError) -> Response {
    let status = if e.is_client_error() {
        warn!("rejected update: {e}");
        StatusCode::BAD_REQUEST
    } else {
        error!("update failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorBody::new(e.to_string()))).into_response()
}
