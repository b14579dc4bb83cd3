use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::models::{AppState, AskRequest, AskResponse, ResetResponse, SessionResponse};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/messages", post(post_message))
        .route("/api/session/reset", post(reset_session))
        .with_state(state)
}

async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let snapshot = state.chat.snapshot();
    Json(SessionResponse::new(&snapshot, state.chat.upload_progress()))
}

/// Queues a question. The answer shows up in the session log once it settles.
async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> AppResult<(StatusCode, Json<AskResponse>)> {
    let message_id = state.chat.ask(request.question).await?;
    info!(%message_id, "Question accepted");

    Ok((StatusCode::ACCEPTED, Json(AskResponse { message_id })))
}

async fn reset_session(State(state): State<AppState>) -> AppResult<Json<ResetResponse>> {
    let session_id = state.chat.reset().await?;
    Ok(Json(ResetResponse { session_id }))
}
