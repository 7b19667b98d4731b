use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use lib_email_clients::gmail::types::PushEnvelope;
use serde_json::{json, Value};

use crate::pipeline::{notification::decode_notification, NotificationOutcome, Pipeline};

/// # POST /api/gmail-webhook
///
/// Always acknowledged with 200 so Pub/Sub does not redeliver. Failures are
/// reported in the body.
pub async fn receive(State(pipeline): State<Arc<Pipeline>>, body: Bytes) -> Json<NotificationOutcome> {
    let notification = match serde_json::from_slice::<PushEnvelope>(&body)
        .map_err(anyhow::Error::from)
        .and_then(|envelope| decode_notification(&envelope))
    {
        Ok(notification) => notification,
        Err(e) => {
            tracing::error!("Undecodable push notification: {:?}", e);
            return Json(NotificationOutcome::failed(format!("invalid notification: {}", e)));
        }
    };

    Json(pipeline.handle_notification(&notification).await)
}

/// # GET /api/gmail-webhook
pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "gmail-webhook",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::notification::SkipReason;
    use crate::testing::fakes::{FakeGenerator, Harness};
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn envelope(data: &str) -> Bytes {
        Bytes::from(
            json!({
                "message": {"data": data, "messageId": "1", "publishTime": "2024-01-01T00:00:00Z"},
                "subscription": "projects/p/subscriptions/s"
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn test_undecodable_envelope_is_acknowledged() {
        let h = Harness::new(FakeGenerator::default());
        let Json(outcome) = receive(State(Arc::new(h.pipeline.clone())), envelope("%%%")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("invalid notification"));

        let Json(outcome) = receive(State(Arc::new(h.pipeline)), Bytes::from_static(b"nope")).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_numeric_history_id_sets_baseline() {
        let h = Harness::new(FakeGenerator::default());
        h.provision().await;
        let data = STANDARD.encode(format!(
            r#"{{"emailAddress":"{}","historyId":4242}}"#,
            Harness::EMAIL
        ));

        let Json(outcome) = receive(State(Arc::new(h.pipeline.clone())), envelope(&data)).await;

        assert_eq!(outcome.skipped, Some(SkipReason::Baseline));
        assert_eq!(h.history_id().as_deref(), Some("4242"));
    }
}
