use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;

use super::{JobQueue, PublishOptions, QueueJob};
use crate::{
    server_config::{cfg, QueueSecrets},
    HttpClient,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: String,
}

/// Publishes jobs to QStash for delivery to the worker endpoint
#[derive(Clone)]
pub struct QStashClient {
    http_client: HttpClient,
    api_base: String,
    token: String,
    worker_url: String,
    retries: u32,
}

impl QStashClient {
    pub fn new(
        http_client: HttpClient,
        api_base: impl Into<String>,
        token: impl Into<String>,
        worker_url: impl Into<String>,
        retries: u32,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            token: token.into(),
            worker_url: worker_url.into(),
            retries,
        }
    }

    pub fn from_config(http_client: HttpClient, secrets: &QueueSecrets) -> Self {
        Self::new(
            http_client,
            cfg.queue.api_base.clone(),
            secrets.token.clone(),
            cfg.worker_url(),
            cfg.queue.retries,
        )
    }
}

#[async_trait]
impl JobQueue for QStashClient {
    async fn publish(&self, job: &QueueJob, options: PublishOptions) -> anyhow::Result<String> {
        let url = format!(
            "{}/v2/publish/{}",
            self.api_base.trim_end_matches('/'),
            self.worker_url
        );

        let mut req = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .header("Upstash-Retries", self.retries.to_string())
            .json(job);
        if let Some(delay) = options.delay {
            req = req.header("Upstash-Delay", format!("{}s", delay.as_secs()));
        }
        if let Some(dedup_id) = &options.deduplication_id {
            req = req.header("Upstash-Deduplication-Id", dedup_id);
        }

        let resp = req.send().await.context("Queue publish request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Queue rejected {} job: {} {}", job.job_type(), status, body));
        }

        let PublishResponse { message_id } = resp.json().await?;
        tracing::info!(
            "Enqueued {} job for user {} as {}",
            job.job_type(),
            job.user_id(),
            message_id
        );

        Ok(message_id)
    }
}
