use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppJsonResult},
    pipeline::Pipeline,
    queue::{signature::QueueAuth, worker::run_job, QueueJob},
};

const SIGNATURE_HEADER: &str = "upstash-signature";

/// # POST /api/queue/worker
///
/// Deliveries are signed by the queue. Without signing keys every delivery
/// is refused; in-process jobs never come through here.
pub async fn handle(
    State(pipeline): State<Arc<Pipeline>>,
    State(auth): State<Option<QueueAuth>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppJsonResult<Value> {
    let auth = auth.ok_or_else(|| {
        tracing::warn!("Queue delivery received but no signing keys are configured");
        AppError::Unauthorized("Queue signing keys not configured".to_string())
    })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing queue signature".to_string()))?;
    auth.verify(signature, &body).map_err(|e| {
        tracing::warn!("Rejected queue delivery: {}", e);
        AppError::Unauthorized("Invalid queue signature".to_string())
    })?;

    let job = serde_json::from_slice::<QueueJob>(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid job: {}", e)))?;

    let outcome = run_job(&pipeline, &job).await.map_err(|e| {
        tracing::error!("{} job for user {} failed: {:?}", job.job_type(), job.user_id(), e);
        AppError::Internal(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "jobType": job.job_type(),
        "outcome": outcome,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::signature::sign_for_test;
    use crate::testing::fakes::{FakeGenerator, Harness};
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::IntoResponse;

    const WORKER: &str = "https://app.example.com/api/queue/worker";

    fn auth() -> Option<QueueAuth> {
        Some(QueueAuth {
            destination: WORKER.to_string(),
            current_key: "current".to_string(),
            next_key: "next".to_string(),
        })
    }

    fn job_body(h: &Harness) -> Bytes {
        Bytes::from(
            serde_json::to_vec(&QueueJob::CategorizeEmail {
                user_id: h.account.user_id,
                email_id: "m1".to_string(),
            })
            .unwrap(),
        )
    }

    fn signed(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = sign_for_test("current", WORKER, body, 300);
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&token).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_unsigned_delivery_is_rejected() {
        let h = Harness::new(FakeGenerator::default());
        let body = job_body(&h);

        let result = handle(State(Arc::new(h.pipeline.clone())), State(auth()), HeaderMap::new(), body).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::UNAUTHORIZED);
        assert!(h.store.processed_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_without_signing_keys_is_rejected() {
        let h = Harness::new(FakeGenerator::default());
        let body = Bytes::from(
            serde_json::to_vec(&QueueJob::GenerateDraft {
                user_id: h.account.user_id,
                message_id: "m1".to_string(),
            })
            .unwrap(),
        );

        let pipeline = Arc::new(h.pipeline.clone());

        let result = handle(
            State(pipeline.clone()),
            State(None),
            HeaderMap::new(),
            body.clone(),
        )
        .await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::UNAUTHORIZED);

        let result = handle(State(pipeline), State(None), signed(&body), body).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::UNAUTHORIZED);
        assert!(h.mailbox.drafts().is_empty());
        assert!(h.store.processed_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_signed_delivery_runs_once() {
        let h = Harness::new(FakeGenerator::default());
        let body = job_body(&h);
        let pipeline = Arc::new(h.pipeline.clone());

        let Json(first) = handle(State(pipeline.clone()), State(auth()), signed(&body), body.clone())
            .await
            .unwrap();
        assert_eq!(first["success"], json!(true));
        assert_eq!(first["outcome"]["status"], json!("completed"));

        let Json(second) = handle(State(pipeline), State(auth()), signed(&body), body)
            .await
            .unwrap();
        assert_eq!(second["outcome"]["status"], json!("duplicate"));
        assert_eq!(h.store.processed_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_job_is_bad_request() {
        let h = Harness::new(FakeGenerator::default());
        let body = Bytes::from_static(br#"{"type":"UNKNOWN"}"#);

        let headers = signed(&body);
        let result = handle(State(Arc::new(h.pipeline)), State(auth()), headers, body).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_job_returns_500() {
        let h = Harness::new(FakeGenerator::default());
        let body = Bytes::from(
            serde_json::to_vec(&QueueJob::GenerateDraft {
                user_id: uuid::Uuid::new_v4(),
                message_id: "m1".to_string(),
            })
            .unwrap(),
        );

        let headers = signed(&body);
        let result = handle(State(Arc::new(h.pipeline)), State(auth()), headers, body).await;
        assert_eq!(
            result.unwrap_err().into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
