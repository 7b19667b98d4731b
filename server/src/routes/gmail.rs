use std::sync::Arc;

use axum::{extract::State, Json};
use futures::{stream, StreamExt};
use google_gmail1::api::Label;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::common::{user_account, user_mailbox, user_settings};
use crate::{
    auth::jwt::Claims,
    email::{
        client::{MessageFormat, MessageListOptions},
        connector::MailConnector,
        message_detail::MessageDetail,
        mime::{build_outgoing, OutgoingEmail},
    },
    error::{AppError, AppJsonResult},
    model::{category::EmailCategory, store::AccountStore},
    pipeline::{
        drafts::draft_reply,
        watch::{register_watch, WatchRegistration, WatchTopic},
        Pipeline,
    },
};

const CATEGORY_DRAFT_LIMIT: u32 = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWatchResponse {
    success: bool,
    #[serde(flatten)]
    registration: WatchRegistration,
}

/// # POST /api/gmail/register-watch
pub async fn register(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
    State(topic): State<WatchTopic>,
) -> AppJsonResult<RegisterWatchResponse> {
    let (account, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    let registration = register_watch(store.as_ref(), mailbox.as_ref(), &account, &topic).await?;

    Ok(Json(RegisterWatchResponse {
        success: true,
        registration,
    }))
}

/// # GET /api/gmail/register-watch
pub async fn watch_status(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
) -> AppJsonResult<Value> {
    let account = user_account(store.as_ref(), claims.sub).await?;
    Ok(Json(json!({
        "hasWatch": account.has_watch(),
        "historyId": account.history_id,
        "email": account.email,
        "watchExpiration": account.watch_expiration,
        "lastUpdated": account.updated_at,
    })))
}

/// # DELETE /api/gmail/register-watch
pub async fn stop(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
) -> AppJsonResult<Value> {
    let (account, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    mailbox.stop_watch().await?;
    store.set_watch(account.user_id, None, None).await?;
    tracing::info!("Watch stopped for {}", account.email);

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryDraftsBody {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResult {
    message_id: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    draft_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDraftsResponse {
    message: String,
    drafts_created: usize,
    total_emails: usize,
    results: Vec<DraftResult>,
}

/// # POST /api/gmail/generate-drafts-for-category
///
/// Drafts replies for the most recent messages carrying the category's label
pub async fn generate_drafts_for_category(
    claims: Claims,
    State(pipeline): State<Arc<Pipeline>>,
    body: Option<Json<CategoryDraftsBody>>,
) -> AppJsonResult<CategoryDraftsResponse> {
    let Json(CategoryDraftsBody { category }) = body.unwrap_or_default();
    let category = category.unwrap_or_else(|| EmailCategory::ToRespond.to_string());

    let settings = user_settings(pipeline.store.as_ref(), claims.sub).await?;
    let categories = settings.categories();
    let definition = categories
        .get(&category)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown category: {}", category)))?;

    let (_, mailbox) =
        user_mailbox(pipeline.store.as_ref(), pipeline.connector.as_ref(), claims.sub).await?;
    let label_id = mailbox
        .list_labels()
        .await?
        .into_iter()
        .find(|l| l.name.as_deref() == Some(definition.label.as_str()))
        .and_then(|l| l.id)
        .ok_or_else(|| AppError::NotFound(format!("Gmail label {} not found", definition.label)))?;

    let ids = mailbox
        .list_messages(MessageListOptions {
            label_ids: vec![label_id],
            max_results: Some(CATEGORY_DRAFT_LIMIT),
            ..Default::default()
        })
        .await?
        .messages
        .into_iter()
        .map(|m| m.id)
        .collect::<Vec<_>>();

    let draft_settings = settings.effective_draft_settings();
    let body_char_limit = pipeline.options.body_char_limit;
    let temperature = pipeline.options.draft_temperature;
    let mailbox = mailbox.as_ref();
    let generator = pipeline.generator.as_ref();
    let draft_settings = &draft_settings;

    let results = stream::iter(ids)
        .map(|message_id| async move {
            let drafted: anyhow::Result<_> = async {
                let message = mailbox.get_message(&message_id, MessageFormat::Full).await?;
                let email = MessageDetail::from_gmail_message(message, body_char_limit);
                draft_reply(mailbox, generator, &email, draft_settings, temperature).await
            }
            .await;
            match drafted {
                Ok(Some(draft)) => DraftResult {
                    message_id,
                    success: true,
                    draft_id: Some(draft.id),
                    error: None,
                },
                Ok(None) => DraftResult {
                    message_id,
                    success: false,
                    draft_id: None,
                    error: Some("empty reply".to_string()),
                },
                Err(e) => {
                    tracing::error!("Draft for {} failed: {:?}", message_id, e);
                    DraftResult {
                        message_id,
                        success: false,
                        draft_id: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .buffered(pipeline.options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let drafts_created = results.iter().filter(|r| r.success).count();
    Ok(Json(CategoryDraftsResponse {
        message: format!("Created {} drafts for {}", drafts_created, category),
        drafts_created,
        total_emails: results.len(),
        results,
    }))
}

/// # POST /api/gmail/create-draft
pub async fn create_draft(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
    Json(email): Json<OutgoingEmail>,
) -> AppJsonResult<Value> {
    let (account, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    let raw = build_outgoing(&email, &account.email)?;
    let draft = mailbox.create_draft(&raw, email.thread_id.as_deref()).await?;

    Ok(Json(json!({ "success": true, "draftId": draft.id })))
}

/// # POST /api/gmail/send
pub async fn send(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
    Json(email): Json<OutgoingEmail>,
) -> AppJsonResult<Value> {
    let (account, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    let raw = build_outgoing(&email, &account.email)?;
    let sent = mailbox.send_message(&raw, email.thread_id.as_deref()).await?;
    tracing::info!("User {} sent message {}", claims.sub, sent.id);

    Ok(Json(json!({
        "success": true,
        "messageId": sent.id,
        "threadId": sent.thread_id,
    })))
}

#[derive(Debug, Serialize)]
pub struct GmailLabelsResponse {
    labels: Vec<Label>,
}

/// # GET /api/gmail/labels
pub async fn labels(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
) -> AppJsonResult<GmailLabelsResponse> {
    let (_, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    let mut labels = mailbox.list_labels().await?;
    labels.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(GmailLabelsResponse { labels }))
}
