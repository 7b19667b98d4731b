use serde::Serialize;
use serde_json::Value;

use super::QueueJob;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The idempotency key was already recorded
    Duplicate,
    Completed { result: Value },
}

/// Runs one delivered job at most once per idempotency key. The key is
/// recorded only after the work succeeded so a failed delivery is retried.
pub async fn run_job(pipeline: &Pipeline, job: &QueueJob) -> anyhow::Result<JobOutcome> {
    let key = job.idempotency_key();
    if pipeline.store.is_job_processed(&key).await? {
        tracing::info!("Job {} already processed, acknowledging", key);
        return Ok(JobOutcome::Duplicate);
    }

    tracing::info!("Running {} job for user {}", job.job_type(), job.user_id());
    let result = match job {
        QueueJob::CategorizeEmail { user_id, email_id } => {
            serde_json::to_value(pipeline.categorize_single(*user_id, email_id).await?)?
        }
        QueueJob::SignupInitialization { user_id, .. } => {
            serde_json::to_value(pipeline.initialize_account(*user_id).await?)?
        }
        QueueJob::GenerateDraft {
            user_id,
            message_id,
        } => {
            let drafted = pipeline.generate_draft_for(*user_id, message_id).await?;
            serde_json::json!({ "drafted": drafted })
        }
    };

    pipeline.store.mark_job_processed(&key, job.job_type()).await?;
    tracing::info!("Job {} done", key);

    Ok(JobOutcome::Completed { result })
}
