use async_trait::async_trait;
use serde_json::Value;

/// Failures of the remote analysis call itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("analysis request timed out")]
    Timeout,

    #[error("analysis service returned HTTP {0}")]
    Status(u16),

    #[error("analysis request failed: {0}")]
    Request(String),

    #[error("failed to decode analysis response: {0}")]
    Decode(String),

    #[error("analysis service reported failure: {0}")]
    ServiceReported(String),
}

/// The remote analysis endpoint, one call per question.
///
/// Returns the decoded JSON body as-is; shaping it into a message is the
/// normalizer's job.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, storage_key: &str, question: &str) -> Result<Value, TransportError>;
}
