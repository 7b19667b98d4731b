use base64::{engine::general_purpose::STANDARD, Engine};
use lib_email_clients::gmail::types::{GmailNotification, PushEnvelope};
use serde::Serialize;

use super::{fetch, labels, Pipeline};
use crate::{
    email::client::MessageFormat,
    model::category::EmailCategory,
    prompt::{classify_batch, EmailSummary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownAccount,
    NoCredentials,
    AutoCategorizeDisabled,
    /// First notification for the account, cursor stored only
    Baseline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub processed: usize,
    pub categorized: usize,
    pub labeled: usize,
    pub label_failures: usize,
    pub labels_skipped: usize,
    pub drafts_generated: usize,
    pub drafts_queued: usize,
    pub draft_failures: usize,
}

/// Body of the webhook acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub summary: Option<ProcessingSummary>,
}

impl NotificationOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            success: true,
            skipped: Some(reason),
            error: None,
            summary: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: None,
            error: Some(error.into()),
            summary: None,
        }
    }

    pub fn processed(summary: ProcessingSummary) -> Self {
        Self {
            success: true,
            skipped: None,
            error: None,
            summary: Some(summary),
        }
    }
}

/// Decodes the base64 `data` of a push delivery
pub fn decode_notification(envelope: &PushEnvelope) -> anyhow::Result<GmailNotification> {
    let bytes = STANDARD
        .decode(envelope.message.data.trim())
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(envelope.message.data.trim()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl Pipeline {
    /// Processes one mailbox change notification. Never fails: every error
    /// ends up in the outcome and the logs.
    pub async fn handle_notification(&self, notification: &GmailNotification) -> NotificationOutcome {
        let GmailNotification {
            email_address,
            history_id,
        } = notification;
        tracing::info!("Notification for {} at history {}", email_address, history_id);

        let account = match self.store.find_by_email(email_address).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::info!("No account for {}", email_address);
                return NotificationOutcome::skipped(SkipReason::UnknownAccount);
            }
            Err(e) => {
                tracing::error!("Account lookup failed for {}: {:?}", email_address, e);
                return NotificationOutcome::failed("account lookup failed");
            }
        };

        let Some(mailbox) = self.connector.connect(&account).await else {
            tracing::warn!("No usable credential for user {}", account.user_id);
            return NotificationOutcome::skipped(SkipReason::NoCredentials);
        };

        let settings = match self.store.settings(account.user_id).await {
            Ok(Some(settings)) if settings.auto_categorize_enabled => settings,
            Ok(_) => {
                tracing::info!("Auto-categorize disabled for user {}", account.user_id);
                return NotificationOutcome::skipped(SkipReason::AutoCategorizeDisabled);
            }
            Err(e) => {
                tracing::error!("Settings lookup failed for user {}: {:?}", account.user_id, e);
                return NotificationOutcome::failed("settings lookup failed");
            }
        };

        let Some(last_history_id) = account.history_id.clone().filter(|h| !h.is_empty()) else {
            if let Err(e) = self.store.set_history_id(account.user_id, history_id).await {
                tracing::error!("Could not store baseline cursor: {:?}", e);
                return NotificationOutcome::failed("could not store history cursor");
            }
            tracing::info!("Stored baseline history {} for user {}", history_id, account.user_id);
            return NotificationOutcome::skipped(SkipReason::Baseline);
        };

        // Advance first so a crash below cannot replay this change set
        if let Err(e) = self.store.set_history_id(account.user_id, history_id).await {
            tracing::error!("Could not advance history cursor: {:?}", e);
            return NotificationOutcome::failed("could not store history cursor");
        }

        let ids = match fetch::added_inbox_message_ids(
            mailbox.as_ref(),
            &last_history_id,
            self.options.history_page_limit,
        )
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    "History fetch from {} failed for user {}: {}",
                    last_history_id,
                    account.user_id,
                    e
                );
                return NotificationOutcome::failed(format!("history fetch failed: {}", e));
            }
        };

        let mut summary = ProcessingSummary::default();
        if ids.is_empty() {
            tracing::info!("No new inbox messages for user {}", account.user_id);
            return NotificationOutcome::processed(summary);
        }

        let details = fetch::fetch_details(
            mailbox.as_ref(),
            &ids,
            MessageFormat::Full,
            self.options.concurrency,
            self.options.body_char_limit,
        )
        .await;
        summary.processed = details.len();
        if details.is_empty() {
            return NotificationOutcome::processed(summary);
        }

        let categories = settings.categories();
        let summaries = details.iter().map(EmailSummary::from).collect::<Vec<_>>();
        let classification = classify_batch(
            self.generator.as_ref(),
            &summaries,
            &categories,
            &settings.active_customization(&categories),
            self.options.classify_temperature,
        )
        .await;
        summary.categorized = classification.len();

        if settings.auto_label_enabled {
            let tally = labels::apply_labels(
                mailbox.as_ref(),
                &classification,
                &settings.labels,
                self.options.concurrency,
                self.options.label_cooldown,
            )
            .await;
            summary.labeled = tally.applied;
            summary.label_failures = tally.failed;
            summary.labels_skipped = tally.skipped;
        }

        let to_respond: &str = EmailCategory::ToRespond.into();
        let needs_reply = details
            .iter()
            .filter(|d| classification.get(&d.id).is_some_and(|c| c == to_respond))
            .collect::<Vec<_>>();

        if settings.auto_draft_enabled && !needs_reply.is_empty() {
            let drafts = self
                .dispatch_drafts(
                    &account,
                    mailbox.as_ref(),
                    &needs_reply,
                    &settings.effective_draft_settings(),
                )
                .await;
            summary.drafts_generated = drafts.generated;
            summary.drafts_queued = drafts.queued;
            summary.draft_failures = drafts.failed;
        }

        tracing::info!("Notification for user {} done: {:?}", account.user_id, summary);
        NotificationOutcome::processed(summary)
    }
}
