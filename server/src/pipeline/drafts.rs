use futures::{stream, StreamExt};
use lib_email_clients::gmail::types::Draft;

use super::Pipeline;
use crate::{
    email::{message_detail::MessageDetail, mime::build_reply_mime, provider::MailProvider},
    model::{account::Account, settings::DraftSettings},
    prompt::{generate_reply, TextGenerator},
    queue::{PublishOptions, QueueJob},
};

/// Generates a reply and stores it as a draft on the message's thread.
/// `Ok(None)` when the model produced nothing to send.
pub async fn draft_reply(
    mailbox: &dyn MailProvider,
    generator: &dyn TextGenerator,
    email: &MessageDetail,
    settings: &DraftSettings,
    temperature: f32,
) -> anyhow::Result<Option<Draft>> {
    let Some(reply) = generate_reply(generator, email, settings, temperature).await? else {
        tracing::info!("Empty reply for {}, no draft created", email.id);
        return Ok(None);
    };

    let raw = build_reply_mime(&email.sender_address(), &email.subject, &reply);
    let draft = mailbox
        .create_draft(&raw, email.thread_id.as_deref())
        .await?;
    tracing::info!("Created draft {} for message {}", draft.id, email.id);

    Ok(Some(draft))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DraftTally {
    pub generated: usize,
    pub queued: usize,
    pub failed: usize,
}

impl Pipeline {
    /// Queues one draft job per message, or drafts inline when no queue is
    /// configured. A message whose job cannot be published is drafted inline.
    pub async fn dispatch_drafts(
        &self,
        account: &Account,
        mailbox: &dyn MailProvider,
        emails: &[&MessageDetail],
        settings: &DraftSettings,
    ) -> DraftTally {
        let mut tally = DraftTally::default();
        let mut inline = Vec::new();

        match &self.queue {
            Some(queue) => {
                for email in emails {
                    let job = QueueJob::GenerateDraft {
                        user_id: account.user_id,
                        message_id: email.id.clone(),
                    };
                    let options = PublishOptions {
                        delay: None,
                        deduplication_id: Some(job.idempotency_key()),
                    };
                    match queue.publish(&job, options).await {
                        Ok(_) => tally.queued += 1,
                        Err(e) => {
                            tracing::error!("Could not queue draft for {}: {:?}", email.id, e);
                            inline.push(*email);
                        }
                    }
                }
            }
            None => inline.extend_from_slice(emails),
        }

        let generator = self.generator.as_ref();
        let temperature = self.options.draft_temperature;
        let results = stream::iter(inline.into_iter().cloned())
            .map(|email| async move {
                let result = draft_reply(mailbox, generator, &email, settings, temperature).await;
                if let Err(e) = &result {
                    tracing::error!("Draft failed for {}: {:?}", email.id, e);
                }
                result
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        for result in results {
            match result {
                Ok(Some(_)) => tally.generated += 1,
                Ok(None) => {}
                Err(_) => tally.failed += 1,
            }
        }

        tally
    }
}
