use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use derive_more::derive::Display;
use google_gmail1::api::{Label, LabelColor, ListLabelsResponse};
use leaky_bucket::RateLimiter;
use lib_email_clients::gmail::{
    api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND},
    types::{
        Draft, DraftRequest, GmailMessage, ListHistoryResponse, ListMessagesResponse,
        MessageRef, ModifyMessageRequest, Profile, RawMessage, WatchRequest, WatchResponse,
    },
    INBOX_LABEL,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::provider::MailProvider;
use crate::HttpClient;

#[derive(Debug, Display)]
pub enum EmailClientError {
    #[display("Gmail rate limit exceeded")]
    RateLimited,
    #[display("Gmail rejected the access token")]
    Unauthorized,
    #[display("Gmail resource not found: {_0}")]
    NotFound(String),
    #[display("Gmail API error {status}: {body}")]
    Api { status: u16, body: String },
    #[display("Gmail transport error: {_0}")]
    Transport(String),
}

impl std::error::Error for EmailClientError {}

pub type EmailClientResult<T> = Result<T, EmailClientError>;

impl From<reqwest::Error> for EmailClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            return EmailClientError::RateLimited;
        }
        EmailClientError::Transport(error.to_string())
    }
}

impl EmailClientError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EmailClientError::RateLimited)
    }

    async fn from_response(resp: Response) -> Self {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::TOO_MANY_REQUESTS => EmailClientError::RateLimited,
            // Gmail reports per-user quota exhaustion as 403 rateLimitExceeded
            StatusCode::FORBIDDEN if body.to_lowercase().contains("ratelimitexceeded") => {
                EmailClientError::RateLimited
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmailClientError::Unauthorized,
            StatusCode::NOT_FOUND => EmailClientError::NotFound(body),
            _ => EmailClientError::Api {
                status: status.as_u16(),
                body,
            },
        }
    }
}

/// Format parameter for Gmail API message requests
#[derive(Debug, Clone, Copy, Default)]
pub enum MessageFormat {
    /// Returns the full email message data with body content parsed
    #[default]
    Full,
    /// Returns only email message IDs and labels
    Minimal,
    /// Returns email metadata (headers) without body
    Metadata,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Full => "full",
            MessageFormat::Minimal => "minimal",
            MessageFormat::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Default, Clone)]
/// Filter and paging options for message list
pub struct MessageListOptions {
    /// Only return messages carrying all of these label ids
    pub label_ids: Vec<String>,
    /// Gmail search query (e.g. "in:inbox")
    pub query: Option<String>,
    pub page_token: Option<String>,
    pub max_results: Option<u32>,
}

macro_rules! gmail_url {
    ($base:expr, $($params:expr),*) => {
        {
            let list_params: Vec<&str> = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", $base.trim_end_matches('/'), path)
        }
    };
}

pub const MAX_MESSAGES_PER_PAGE_DEFAULT: u32 = 100;

/// Token bucket sized to Gmail's per-user quota
pub fn gmail_rate_limiter() -> Arc<RateLimiter> {
    Arc::new(
        RateLimiter::builder()
            .initial(GMAIL_QUOTA_PER_SECOND)
            .max(GMAIL_QUOTA_PER_SECOND)
            .interval(Duration::from_secs(1))
            .refill(GMAIL_QUOTA_PER_SECOND)
            .build(),
    )
}

#[derive(Debug, Clone)]
pub struct EmailClient {
    http_client: HttpClient,
    api_base: String,
    access_token: String,
    rate_limiter: Arc<RateLimiter>,
    pub email_address: String,
}

impl EmailClient {
    pub fn new(
        http_client: HttpClient,
        api_base: impl Into<String>,
        access_token: impl Into<String>,
        email_address: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
    ) -> EmailClient {
        EmailClient {
            http_client,
            api_base: api_base.into(),
            access_token: access_token.into(),
            rate_limiter,
            email_address: email_address.into(),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> EmailClientResult<T> {
        let resp = req.bearer_auth(&self.access_token).send().await?;
        if !resp.status().is_success() {
            return Err(EmailClientError::from_response(resp).await);
        }
        Ok(resp.json::<T>().await?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> EmailClientResult<()> {
        let resp = req.bearer_auth(&self.access_token).send().await?;
        if !resp.status().is_success() {
            return Err(EmailClientError::from_response(resp).await);
        }
        Ok(())
    }
}

#[async_trait]
impl MailProvider for EmailClient {
    fn email_address(&self) -> &str {
        &self.email_address
    }

    async fn list_history(
        &self,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> EmailClientResult<ListHistoryResponse> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.history_list).await;
        let mut query = vec![
            ("startHistoryId", start_history_id),
            ("historyTypes", "messageAdded"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let req = self
            .http_client
            .get(gmail_url!(self.api_base, "history"))
            .query(&query);

        self.send_json(req).await
    }

    async fn get_message(
        &self,
        message_id: &str,
        format: MessageFormat,
    ) -> EmailClientResult<GmailMessage> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.messages_get).await;
        let req = self
            .http_client
            .get(gmail_url!(self.api_base, "messages", message_id))
            .query(&[("format", format.as_str())]);

        self.send_json(req).await
    }

    async fn list_messages(
        &self,
        options: MessageListOptions,
    ) -> EmailClientResult<ListMessagesResponse> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;
        let max_results = options.max_results.unwrap_or(MAX_MESSAGES_PER_PAGE_DEFAULT);
        let mut query = vec![("maxResults".to_string(), max_results.to_string())];
        for label_id in options.label_ids {
            query.push(("labelIds".to_string(), label_id));
        }
        if let Some(q) = options.query {
            query.push(("q".to_string(), q));
        }
        if let Some(token) = options.page_token {
            query.push(("pageToken".to_string(), token));
        }
        let req = self
            .http_client
            .get(gmail_url!(self.api_base, "messages"))
            .query(&query);

        self.send_json(req).await
    }

    async fn list_labels(&self) -> EmailClientResult<Vec<Label>> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.labels_list).await;
        let req = self.http_client.get(gmail_url!(self.api_base, "labels"));
        let data: ListLabelsResponse = self.send_json(req).await?;

        Ok(data.labels.unwrap_or_default())
    }

    async fn create_label(&self, name: &str, color: LabelColor) -> EmailClientResult<Label> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.labels_create)
            .await;
        let label = Label {
            name: Some(name.to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            color: Some(color),
            ..Default::default()
        };
        let req = self
            .http_client
            .post(gmail_url!(self.api_base, "labels"))
            .json(&label);

        match self.send_json::<Label>(req).await {
            Err(EmailClientError::Api { status: 409, .. }) => {
                // Label already exists, hand back the existing one
                tracing::info!("Label {} already exists for {}", name, self.email_address);
                self.list_labels()
                    .await?
                    .into_iter()
                    .find(|l| l.name.as_deref() == Some(name))
                    .ok_or_else(|| EmailClientError::NotFound(format!("label {}", name)))
            }
            other => other,
        }
    }

    async fn delete_label(&self, label_id: &str) -> EmailClientResult<()> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.labels_delete)
            .await;
        let req = self
            .http_client
            .delete(gmail_url!(self.api_base, "labels", label_id));

        self.send_empty(req).await
    }

    async fn add_label(&self, message_id: &str, label_id: &str) -> EmailClientResult<()> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_modify)
            .await;
        let req = self
            .http_client
            .post(gmail_url!(self.api_base, "messages", message_id, "modify"))
            .json(&ModifyMessageRequest {
                add_label_ids: vec![label_id.to_string()],
                remove_label_ids: vec![],
            });

        self.send_empty(req).await
    }

    async fn create_draft(&self, raw: &str, thread_id: Option<&str>) -> EmailClientResult<Draft> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.drafts_create)
            .await;
        let req = self
            .http_client
            .post(gmail_url!(self.api_base, "drafts"))
            .json(&DraftRequest {
                message: RawMessage {
                    raw: raw.to_string(),
                    thread_id: thread_id.map(str::to_string),
                },
            });

        self.send_json(req).await
    }

    /// Send an email using the Gmail API
    /// The raw message should be a base64url-encoded RFC 2822 MIME message
    async fn send_message(
        &self,
        raw: &str,
        thread_id: Option<&str>,
    ) -> EmailClientResult<MessageRef> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_send)
            .await;
        let req = self
            .http_client
            .post(gmail_url!(self.api_base, "messages", "send"))
            .json(&RawMessage {
                raw: raw.to_string(),
                thread_id: thread_id.map(str::to_string),
            });

        self.send_json(req).await
    }

    async fn watch_mailbox(&self, topic_name: &str) -> EmailClientResult<WatchResponse> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.watch).await;
        let req = self
            .http_client
            .post(gmail_url!(self.api_base, "watch"))
            .json(&WatchRequest {
                topic_name: topic_name.to_string(),
                label_ids: vec![INBOX_LABEL.to_string()],
                label_filter_behavior: "INCLUDE".to_string(),
            });

        self.send_json(req).await
    }

    async fn stop_watch(&self) -> EmailClientResult<()> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.stop).await;
        let req = self.http_client.post(gmail_url!(self.api_base, "stop"));

        self.send_empty(req).await
    }

    async fn get_profile(&self) -> EmailClientResult<Profile> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.get_profile).await;
        let req = self.http_client.get(gmail_url!(self.api_base, "profile"));

        self.send_json(req).await
    }
}
