use async_trait::async_trait;
use google_gmail1::api::{Label, LabelColor};
use lib_email_clients::gmail::types::{
    Draft, GmailMessage, ListHistoryResponse, ListMessagesResponse, MessageRef, Profile,
    WatchResponse,
};

use super::client::{EmailClientResult, MessageFormat, MessageListOptions};

/// The mailbox operations the pipeline and routes perform on behalf of one
/// account
#[async_trait]
pub trait MailProvider: Send + Sync {
    fn email_address(&self) -> &str;

    async fn list_history(
        &self,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> EmailClientResult<ListHistoryResponse>;

    async fn get_message(
        &self,
        message_id: &str,
        format: MessageFormat,
    ) -> EmailClientResult<GmailMessage>;

    async fn list_messages(
        &self,
        options: MessageListOptions,
    ) -> EmailClientResult<ListMessagesResponse>;

    async fn list_labels(&self) -> EmailClientResult<Vec<Label>>;

    async fn create_label(&self, name: &str, color: LabelColor) -> EmailClientResult<Label>;

    async fn delete_label(&self, label_id: &str) -> EmailClientResult<()>;

    async fn add_label(&self, message_id: &str, label_id: &str) -> EmailClientResult<()>;

    async fn create_draft(&self, raw: &str, thread_id: Option<&str>) -> EmailClientResult<Draft>;

    async fn send_message(
        &self,
        raw: &str,
        thread_id: Option<&str>,
    ) -> EmailClientResult<MessageRef>;

    async fn watch_mailbox(&self, topic_name: &str) -> EmailClientResult<WatchResponse>;

    async fn stop_watch(&self) -> EmailClientResult<()>;

    async fn get_profile(&self) -> EmailClientResult<Profile>;
}
