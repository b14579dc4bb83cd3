use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use tracing::{info, warn};

use crate::models::{AppState, UploadResponse};
use crate::storage::UploadFile;
use crate::types::{AppError, AppResult};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session/upload", post(upload_dataset))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn upload_dataset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let file = read_file_field(&mut multipart).await?;
    info!(file = %file.name, bytes = file.size(), "Dataset upload request received");

    let storage_key = state.chat.upload(file).await?;
    Ok(Json(UploadResponse { storage_key }))
}

async fn read_file_field(multipart: &mut Multipart) -> AppResult<UploadFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

        return UploadFile::new(&name, content_type, bytes).map_err(|e| {
            warn!(file = %name, error = %e, "Rejected upload");
            AppError::InvalidRequest(e.to_string())
        });
    }

    Err(AppError::InvalidRequest("missing multipart field `file`".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UploadError;
    use crate::testing::{test_state, ScriptedGateway};
    use std::sync::Arc;
    use tokio::sync::Notify;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "gchatter-boundary";

    fn multipart_request(field: &str, file_name: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n--{b}--\r\n",
            b = BOUNDARY,
        );
        Request::post("/api/session/upload")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_upload_returns_storage_key() {
        let state = test_state(vec![], ScriptedGateway::succeeding("analytics/"));
        let (status, body) = send(
            router(state.clone()),
            multipart_request("file", "sales.csv", "name,sales\nA,100"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storage_key"], "analytics/sales.csv");
    }

    #[tokio::test]
    async fn test_non_csv_is_rejected() {
        let state = test_state(vec![], ScriptedGateway::succeeding("analytics/"));
        let (status, _) = send(router(state), multipart_request("file", "notes.txt", "hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_field_is_rejected() {
        let state = test_state(vec![], ScriptedGateway::succeeding("analytics/"));
        let (status, body) = send(router(state), multipart_request("other", "sales.csv", "a,b")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_transfer_failure_is_bad_gateway() {
        let state = test_state(
            vec![],
            ScriptedGateway::failing(UploadError::Transfer("Failed to upload file to S3".into())),
        );
        let (status, body) = send(router(state), multipart_request("file", "sales.csv", "a,b")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Failed to upload file to S3");
    }

    #[tokio::test]
    async fn test_upload_overtaken_by_reset_conflicts() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(ScriptedGateway::succeeding("analytics/").held_by(gate.clone()));
        let state = test_state(vec![], gateway.clone());

        let app = router(state.clone());
        let request = tokio::spawn(send(app, multipart_request("file", "sales.csv", "a,b")));
        while gateway.uploads() == 0 {
            tokio::task::yield_now().await;
        }
        state.chat.reset().await.unwrap();
        gate.notify_one();

        let (status, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "The chat was reset before the upload finished");
        assert!(!state.chat.snapshot().session.has_dataset());
    }
}
