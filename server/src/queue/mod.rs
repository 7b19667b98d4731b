use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod client;
pub mod signature;
pub mod worker;

pub use client::QStashClient;

/// Work handed to the queue worker. Jobs never carry credentials; the
/// worker resolves a fresh token for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueJob {
    #[serde(rename_all = "camelCase")]
    CategorizeEmail { user_id: Uuid, email_id: String },
    /// `requested_at` (epoch millis) distinguishes one connect from the next
    #[serde(rename_all = "camelCase")]
    SignupInitialization {
        user_id: Uuid,
        user_email: String,
        #[serde(default)]
        requested_at: i64,
    },
    #[serde(rename_all = "camelCase")]
    GenerateDraft { user_id: Uuid, message_id: String },
}

impl QueueJob {
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::CategorizeEmail { user_id, email_id } => {
                format!("categorize-{}-{}", user_id, email_id)
            }
            QueueJob::SignupInitialization {
                user_id,
                user_email,
                requested_at,
            } => format!("signup-{}-{}-{}", user_id, user_email, requested_at),
            QueueJob::GenerateDraft { message_id, .. } => format!("draft-{}", message_id),
        }
    }

    pub fn job_type(&self) -> &'static str {
        match self {
            QueueJob::CategorizeEmail { .. } => "CATEGORIZE_EMAIL",
            QueueJob::SignupInitialization { .. } => "SIGNUP_INITIALIZATION",
            QueueJob::GenerateDraft { .. } => "GENERATE_DRAFT",
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            QueueJob::CategorizeEmail { user_id, .. }
            | QueueJob::SignupInitialization { user_id, .. }
            | QueueJob::GenerateDraft { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub delay: Option<Duration>,
    pub deduplication_id: Option<String>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns the queue's message id
    async fn publish(&self, job: &QueueJob, options: PublishOptions) -> anyhow::Result<String>;
}
