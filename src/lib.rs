// G-Chatter - conversational analytics over uploaded CSV datasets

pub mod config;
pub mod models;
pub mod types;
pub mod session;
pub mod analysis;
pub mod queue;
pub mod storage;
pub mod routes;
pub mod middleware;
pub mod repl;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use analysis::{AnalysisInvoker, HttpAnalysisService};
use queue::ChatHandle;
use storage::S3UploadGateway;
use types::{AppError, AppResult};

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}

/// Wires the HTTP analysis service and S3 gateway into a running chat
/// session. Must be called from within a Tokio runtime.
pub fn spawn_chat(config: &Config) -> AppResult<ChatHandle> {
    let service = HttpAnalysisService::new(&config.analysis.url)
        .map_err(|e| AppError::Internal(format!("analysis client setup failed: {}", e)))?;
    let gateway = S3UploadGateway::new(&config.storage)?;
    let invoker = AnalysisInvoker::new(Arc::new(service)).with_timeout(config.analysis.timeout());

    Ok(ChatHandle::spawn(invoker, Arc::new(gateway), config.queue.capacity))
}
