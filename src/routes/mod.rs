//! API Routes
//!
//! HTTP surface over the single chat session:
//! - `/api/health` - Health check
//! - `/api/session` - Conversation snapshot, questions and reset
//! - `/api/session/upload` - Dataset upload (multipart, field `file`)

pub mod files;
pub mod health;
pub mod session;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::apply_cors;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let origins = state.config.server.cors_allowed_origins.clone();
    let router = Router::new()
        .merge(health::router(state.clone()))
        .merge(session::router(state.clone()))
        .merge(files::router(state))
        .layer(TraceLayer::new_for_http());

    apply_cors(router, &origins)
}
