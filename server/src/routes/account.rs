use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::jwt::Claims,
    error::{AppError, AppJsonResult},
    pipeline::Pipeline,
    queue::{worker::run_job, PublishOptions, QueueJob},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBody {
    email: String,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// # POST /api/account/connect
///
/// Stores the Gmail tokens and kicks off signup initialisation
pub async fn connect(
    claims: Claims,
    State(pipeline): State<Arc<Pipeline>>,
    Json(ConnectBody {
        email,
        access_token,
        refresh_token,
    }): Json<ConnectBody>,
) -> AppJsonResult<Value> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || access_token.trim().is_empty() {
        return Err(AppError::BadRequest(
            "email and accessToken are required".to_string(),
        ));
    }

    let account = pipeline
        .store
        .connect(
            claims.sub,
            &email,
            access_token.trim(),
            refresh_token.as_deref().map(str::trim).filter(|t| !t.is_empty()),
        )
        .await?;
    tracing::info!("User {} connected {}", account.user_id, account.email);

    let job = QueueJob::SignupInitialization {
        user_id: account.user_id,
        user_email: account.email.clone(),
        requested_at: chrono::Utc::now().timestamp_millis(),
    };
    let signup = match &pipeline.queue {
        Some(queue) => {
            let options = PublishOptions {
                delay: None,
                deduplication_id: Some(job.idempotency_key()),
            };
            let message_id = queue.publish(&job, options).await?;
            tracing::info!("Queued signup for {} as {}", account.email, message_id);
            "queued"
        }
        None => {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                if let Err(e) = run_job(&pipeline, &job).await {
                    tracing::error!("Signup initialization failed: {:?}", e);
                }
            });
            "started"
        }
    };

    Ok(Json(json!({
        "success": true,
        "userId": account.user_id,
        "email": account.email,
        "signup": signup,
    })))
}
