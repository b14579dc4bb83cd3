// reqwest-backed analysis service
// Request body: {"s3_key": "...", "query": "..."}

use crate::analysis::provider::{AnalysisService, TransportError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpAnalysisService {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    s3_key: &'a str,
    query: &'a str,
}

impl HttpAnalysisService {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, storage_key: &str, question: &str) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&AnalyzeRequest {
                s3_key: storage_key,
                query: question,
            })
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Analysis service returned an error status");
            return Err(TransportError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        check_reported_status(&body)?;
        debug!(storage_key, "Analysis response received");
        Ok(body)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(err.to_string())
    }
}

/// Best-effort `status` field: an explicit `error`/`failed` counts as a failed call.
fn check_reported_status(body: &Value) -> Result<(), TransportError> {
    let Some(status) = body.get("status").and_then(Value::as_str) else {
        return Ok(());
    };
    if status.eq_ignore_ascii_case("error") || status.eq_ignore_ascii_case("failed") {
        let detail = ["message", "error", "detail"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .unwrap_or(status);
        return Err(TransportError::ServiceReported(detail.to_string()));
    }
    Ok(())
}
