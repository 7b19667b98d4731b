use std::{sync::Arc, time::Duration};

use anyhow::Context;
use serde::Serialize;
use uuid::Uuid;

use super::{drafts::draft_reply, fetch, labels, Pipeline};
use crate::{
    email::{
        client::{MessageFormat, MessageListOptions},
        message_detail::MessageDetail,
        provider::MailProvider,
    },
    model::{account::Account, category::EmailCategory, settings::UserSettings},
    prompt::{classify_batch, EmailSummary},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupSummary {
    pub labels_provisioned: usize,
    pub messages_fetched: usize,
    pub categorized: usize,
    pub labeled: usize,
    pub label_failures: usize,
    pub labels_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleCategorization {
    pub email_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub labeled: bool,
    pub drafted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl Pipeline {
    /// Loads the account and a connected mailbox for a queued job
    async fn open_mailbox(&self, user_id: Uuid) -> anyhow::Result<(Account, Arc<dyn MailProvider>)> {
        let account = self
            .store
            .get(user_id)
            .await?
            .with_context(|| format!("no account for user {}", user_id))?;
        let mailbox = self
            .connector
            .connect(&account)
            .await
            .with_context(|| format!("no usable credential for user {}", user_id))?;
        Ok((account, mailbox))
    }

    /// Prepares a freshly connected mailbox: provisions the category labels,
    /// then classifies and labels its most recent messages.
    pub async fn initialize_account(&self, user_id: Uuid) -> anyhow::Result<SignupSummary> {
        let signup = &self.options.signup;
        let (account, mailbox) = self.open_mailbox(user_id).await?;
        let mut settings = self.store.settings(user_id).await?.unwrap_or_default();
        let mut summary = SignupSummary::default();
        tracing::info!("Initializing mailbox {} for user {}", account.email, user_id);

        let labels = labels::provision_labels(mailbox.as_ref(), &settings.categories(), &settings.labels)
            .await
            .context("label provisioning failed")?;
        summary.labels_provisioned = labels.len();
        settings.labels = labels;
        self.store.save_settings(user_id, &settings).await?;
        tokio::time::sleep(Duration::from_millis(signup.label_settle_ms)).await;

        let recent = mailbox
            .list_messages(MessageListOptions {
                max_results: Some(signup.recent_message_count),
                ..Default::default()
            })
            .await
            .context("listing recent messages failed")?;
        let ids = recent.messages.into_iter().map(|m| m.id).collect::<Vec<_>>();
        if ids.is_empty() {
            tracing::info!("No recent messages for user {}", user_id);
            return Ok(summary);
        }

        let details = fetch::fetch_details(
            mailbox.as_ref(),
            &ids,
            MessageFormat::Metadata,
            self.options.concurrency,
            self.options.body_char_limit,
        )
        .await;
        summary.messages_fetched = details.len();
        tokio::time::sleep(Duration::from_millis(signup.fetch_settle_ms)).await;

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

        let tally = labels::apply_labels_sequential(
            mailbox.as_ref(),
            &classification,
            &settings.labels,
            Duration::from_millis(signup.label_spacing_ms),
            Duration::from_millis(signup.rate_limit_cooldown_ms),
        )
        .await;
        summary.labeled = tally.applied;
        summary.label_failures = tally.failed;
        summary.labels_skipped = tally.skipped;

        tracing::info!("Signup for user {} done: {:?}", user_id, summary);
        Ok(summary)
    }

    /// Classifies and labels one message, drafting a reply when it needs one
    pub async fn categorize_single(
        &self,
        user_id: Uuid,
        email_id: &str,
    ) -> anyhow::Result<SingleCategorization> {
        let mut result = SingleCategorization {
            email_id: email_id.to_string(),
            ..Default::default()
        };
        let (_, mailbox) = self.open_mailbox(user_id).await?;
        let settings = self.store.settings(user_id).await?.unwrap_or_default();
        if settings.labels.is_empty() {
            tracing::info!("User {} has no labels yet, skipping {}", user_id, email_id);
            result.skipped = Some("no_labels".to_string());
            return Ok(result);
        }

        let email = self.fetch_one(mailbox.as_ref(), email_id).await?;
        let categories = settings.categories();
        let classification = classify_batch(
            self.generator.as_ref(),
            &[EmailSummary::from(&email)],
            &categories,
            &settings.active_customization(&categories),
            self.options.classify_temperature,
        )
        .await;
        let category = classification
            .get(email_id)
            .cloned()
            .unwrap_or_else(|| categories.default_key().to_string());

        let outcome = labels::apply_one(
            mailbox.as_ref(),
            email_id,
            &category,
            &settings.labels,
            self.options.label_cooldown,
        )
        .await;
        result.labeled = outcome == labels::LabelOutcome::Applied;

        let to_respond: &str = EmailCategory::ToRespond.into();
        if category == to_respond && settings.auto_draft_enabled {
            result.drafted = self
                .draft_inline(mailbox.as_ref(), &email, &settings)
                .await?;
        }
        result.category = Some(category);

        Ok(result)
    }

    /// Drafts a reply for a message handed over by the queue
    pub async fn generate_draft_for(&self, user_id: Uuid, message_id: &str) -> anyhow::Result<bool> {
        let (_, mailbox) = self.open_mailbox(user_id).await?;
        let settings = self.store.settings(user_id).await?.unwrap_or_default();
        let email = self.fetch_one(mailbox.as_ref(), message_id).await?;
        self.draft_inline(mailbox.as_ref(), &email, &settings).await
    }

    async fn fetch_one(&self, mailbox: &dyn MailProvider, message_id: &str) -> anyhow::Result<MessageDetail> {
        let message = mailbox
            .get_message(message_id, MessageFormat::Full)
            .await
            .with_context(|| format!("fetching message {} failed", message_id))?;
        Ok(MessageDetail::from_gmail_message(message, self.options.body_char_limit))
    }

    async fn draft_inline(
        &self,
        mailbox: &dyn MailProvider,
        email: &MessageDetail,
        settings: &UserSettings,
    ) -> anyhow::Result<bool> {
        let draft = draft_reply(
            mailbox,
            self.generator.as_ref(),
            email,
            &settings.effective_draft_settings(),
            self.options.draft_temperature,
        )
        .await?;
        Ok(draft.is_some())
    }
}
