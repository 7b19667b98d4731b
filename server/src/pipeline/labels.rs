use std::time::Duration;

use futures::{stream, StreamExt};
use lib_email_clients::gmail::label_colors::PaletteColor;
use strum::Display;

use crate::{
    email::{
        client::{EmailClientError, EmailClientResult},
        provider::MailProvider,
    },
    model::{
        category::CategorySet,
        settings::{label_config_for, LabelConfig, LabelsRecord},
    },
    prompt::categorize::Classification,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LabelSkipReason {
    /// No provisioned label for the category
    Missing,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    Applied,
    Skipped(LabelSkipReason),
    Failed { rate_limited: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelTally {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl LabelTally {
    fn record(&mut self, outcome: &LabelOutcome) {
        match outcome {
            LabelOutcome::Applied => self.applied += 1,
            LabelOutcome::Skipped(_) => self.skipped += 1,
            LabelOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

pub fn resolve_label<'a>(
    labels: &'a LabelsRecord,
    category: &str,
) -> Result<&'a LabelConfig, LabelSkipReason> {
    match labels.get(category) {
        Some(label) if label.id.is_empty() => Err(LabelSkipReason::Missing),
        Some(label) if !label.enabled => Err(LabelSkipReason::Disabled),
        Some(label) => Ok(label),
        None => Err(LabelSkipReason::Missing),
    }
}

/// Attaches the category's label. A rate-limited call waits out `cooldown`
/// before the slot moves on to the next message.
pub async fn apply_one(
    mailbox: &dyn MailProvider,
    message_id: &str,
    category: &str,
    labels: &LabelsRecord,
    cooldown: Duration,
) -> LabelOutcome {
    let label = match resolve_label(labels, category) {
        Ok(label) => label,
        Err(reason) => {
            tracing::info!(
                "Not labelling {} as {}: label {}",
                message_id,
                category,
                reason
            );
            return LabelOutcome::Skipped(reason);
        }
    };

    match mailbox.add_label(message_id, &label.id).await {
        Ok(()) => {
            tracing::info!("Labelled {} as {} ({})", message_id, category, label.id);
            LabelOutcome::Applied
        }
        Err(EmailClientError::RateLimited) => {
            tracing::warn!(
                "Rate limited labelling {}, cooling down for {:?}",
                message_id,
                cooldown
            );
            tokio::time::sleep(cooldown).await;
            LabelOutcome::Failed { rate_limited: true }
        }
        Err(e) => {
            tracing::error!("Failed to label {}: {}", message_id, e);
            LabelOutcome::Failed {
                rate_limited: false,
            }
        }
    }
}

/// Labels a classified batch with bounded concurrency
pub async fn apply_labels(
    mailbox: &dyn MailProvider,
    classification: &Classification,
    labels: &LabelsRecord,
    concurrency: usize,
    cooldown: Duration,
) -> LabelTally {
    let tally = stream::iter(classification.clone())
        .map(|(message_id, category)| async move {
            apply_one(mailbox, &message_id, &category, labels, cooldown).await
        })
        .buffer_unordered(concurrency.max(1))
        .fold(LabelTally::default(), |mut tally, outcome| async move {
            tally.record(&outcome);
            tally
        })
        .await;

    tracing::info!(
        "Labels for {}: {} applied, {} failed, {} skipped",
        mailbox.email_address(),
        tally.applied,
        tally.failed,
        tally.skipped
    );
    tally
}

/// One label at a time with a fixed gap between calls
pub async fn apply_labels_sequential(
    mailbox: &dyn MailProvider,
    classification: &Classification,
    labels: &LabelsRecord,
    spacing: Duration,
    cooldown: Duration,
) -> LabelTally {
    let mut tally = LabelTally::default();
    for (message_id, category) in classification {
        let outcome = apply_one(mailbox, message_id, category, labels, cooldown).await;
        if !matches!(outcome, LabelOutcome::Skipped(_)) && !spacing.is_zero() {
            tokio::time::sleep(spacing).await;
        }
        tally.record(&outcome);
    }
    tally
}

/// Ensures a Gmail label exists for every category. Labels are matched on
/// their exact display name so repeated runs reuse the same ids. Existing
/// mappings keep their enabled flag.
pub async fn provision_labels(
    mailbox: &dyn MailProvider,
    categories: &CategorySet,
    existing: &LabelsRecord,
) -> EmailClientResult<LabelsRecord> {
    let gmail_labels = mailbox.list_labels().await?;
    let mut record = existing.clone();
    let (mut reused, mut created) = (0, 0);

    for definition in categories.iter() {
        let found = gmail_labels
            .iter()
            .find(|l| l.name.as_deref() == Some(definition.label.as_str()))
            .and_then(|l| l.id.clone());

        let id = match found {
            Some(id) => {
                reused += 1;
                id
            }
            None => {
                let color = PaletteColor::from_name(&definition.color).label_color();
                match mailbox.create_label(&definition.label, color).await {
                    Ok(label) => match label.id {
                        Some(id) => {
                            created += 1;
                            id
                        }
                        None => {
                            tracing::error!("Gmail returned label {} without id", definition.label);
                            continue;
                        }
                    },
                    Err(e) => {
                        tracing::error!("Failed to create label {}: {}", definition.label, e);
                        continue;
                    }
                }
            }
        };

        let enabled = existing
            .get(&definition.key)
            .map(|l| l.enabled)
            .unwrap_or(true);
        record.insert(
            definition.key.clone(),
            label_config_for(definition, id, enabled),
        );
    }

    tracing::info!(
        "Provisioned labels for {}: {} reused, {} created",
        mailbox.email_address(),
        reused,
        created
    );
    Ok(record)
}
