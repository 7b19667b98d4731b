use futures::{stream, StreamExt};
use indexmap::IndexSet;
use lib_email_clients::gmail::INBOX_LABEL;

use crate::email::{
    client::{EmailClientResult, MessageFormat},
    message_detail::MessageDetail,
    provider::MailProvider,
};

/// Ids of messages added to the inbox since `start_history_id`, first
/// arrival order, without duplicates
pub async fn added_inbox_message_ids(
    mailbox: &dyn MailProvider,
    start_history_id: &str,
    page_limit: usize,
) -> EmailClientResult<Vec<String>> {
    let mut ids = IndexSet::new();
    let mut page_token: Option<String> = None;

    for _ in 0..page_limit.max(1) {
        let page = mailbox
            .list_history(start_history_id, page_token.as_deref())
            .await?;

        page.history
            .iter()
            .flat_map(|record| record.messages_added.iter())
            .map(|added| &added.message)
            .filter(|msg| msg.label_ids.iter().any(|l| l == INBOX_LABEL))
            .for_each(|msg| {
                ids.insert(msg.id.clone());
            });

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => return Ok(ids.into_iter().collect()),
        }
    }

    tracing::warn!(
        "History for {} exceeded {} page(s), remaining pages dropped",
        mailbox.email_address(),
        page_limit
    );
    Ok(ids.into_iter().collect())
}

/// Fetches messages with at most `concurrency` requests in flight. Failed
/// fetches and messages sent by the mailbox owner are dropped. Input order
/// is kept.
pub async fn fetch_details(
    mailbox: &dyn MailProvider,
    ids: &[String],
    format: MessageFormat,
    concurrency: usize,
    body_char_limit: usize,
) -> Vec<MessageDetail> {
    let owner = mailbox.email_address().to_string();

    stream::iter(ids.iter().cloned())
        .map(|id| async move {
            match mailbox.get_message(&id, format).await {
                Ok(msg) => Some(MessageDetail::from_gmail_message(msg, body_char_limit)),
                Err(e) => {
                    tracing::warn!("Could not fetch message {}: {}", id, e);
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(|detail| {
            let owner = owner.clone();
            async move {
                let detail = detail?;
                if detail.is_sent_by(&owner) {
                    tracing::debug!("Skipping self-sent message {}", detail.id);
                    return None;
                }
                Some(detail)
            }
        })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fakes::{history_page, FakeMailbox};

    #[tokio::test]
    async fn test_ids_are_deduplicated_across_pages() {
        let mailbox = FakeMailbox::new("me@example.com");
        mailbox.push_history_page(
            history_page(&[("m1", "INBOX"), ("m2", "SENT"), ("m3", "INBOX,UNREAD")], Some("p2")),
        );
        mailbox.push_history_page(history_page(&[("m1", "INBOX"), ("m4", "INBOX")], None));

        let ids = added_inbox_message_ids(&mailbox, "100", 10).await.unwrap();
        assert_eq!(ids, vec!["m1", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_page_limit_is_respected() {
        let mailbox = FakeMailbox::new("me@example.com");
        mailbox.push_history_page(history_page(&[("m1", "INBOX")], Some("p2")));
        mailbox.push_history_page(history_page(&[("m2", "INBOX")], None));

        let ids = added_inbox_message_ids(&mailbox, "100", 1).await.unwrap();
        assert_eq!(ids, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_self_sent_and_missing_messages_are_dropped() {
        let mailbox = FakeMailbox::new("me@example.com");
        mailbox.add_message("m1", "t1", "Bob <bob@x.com>", "Hello", "hi there");
        mailbox.add_message("m2", "t2", "Me <ME@example.com>", "Note to self", "remember");

        let ids = vec!["m1".to_string(), "m2".to_string(), "gone".to_string()];
        let details = fetch_details(&mailbox, &ids, MessageFormat::Full, 5, 1000).await;
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].id, "m1");
        assert_eq!(details[0].body, "hi there");
    }
}
