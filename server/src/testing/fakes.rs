use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Utc};
use google_gmail1::api::{Label, LabelColor};
use lib_email_clients::gmail::types::{
    Draft, GmailMessage, HistoryMessageAdded, HistoryRecord, ListHistoryResponse,
    ListMessagesResponse, MessageHeader, MessagePart, MessagePartBody, MessageRef, Profile,
    RawMessage, WatchResponse,
};
use uuid::Uuid;

use crate::{
    email::{
        client::{EmailClientError, EmailClientResult, MessageFormat, MessageListOptions},
        connector::MailConnector,
        provider::MailProvider,
    },
    model::{
        account::Account, category::CategorySet, settings::UserSettings, store::AccountStore,
    },
    pipeline::{labels::provision_labels, Pipeline, PipelineOptions},
    prompt::TextGenerator,
    queue::{JobQueue, PublishOptions, QueueJob},
    server_config::SignupConfig,
};

pub fn test_account(email: &str) -> Account {
    Account {
        user_id: Uuid::new_v4(),
        email: email.to_string(),
        access_token: None,
        refresh_token: None,
        history_id: None,
        watch_expiration: None,
        updated_at: Utc::now(),
    }
}

/// Labels given as a comma separated list
pub fn history_page(added: &[(&str, &str)], next_page_token: Option<&str>) -> ListHistoryResponse {
    let messages_added = added
        .iter()
        .map(|(id, labels)| HistoryMessageAdded {
            message: MessageRef {
                id: id.to_string(),
                thread_id: None,
                label_ids: labels
                    .split(',')
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
        })
        .collect();
    ListHistoryResponse {
        history: vec![HistoryRecord {
            id: None,
            messages_added,
        }],
        history_id: None,
        next_page_token: next_page_token.map(str::to_string),
    }
}

#[derive(Default)]
struct StoreState {
    accounts: HashMap<Uuid, Account>,
    settings: HashMap<Uuid, UserSettings>,
    processed_jobs: HashMap<String, String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn with_account(account: Account) -> Self {
        let store = Self::default();
        store.insert_account(account);
        store
    }

    pub fn insert_account(&self, account: Account) {
        self.state.lock().unwrap().accounts.insert(account.user_id, account);
    }

    pub fn put_settings(&self, user_id: Uuid, settings: UserSettings) {
        self.state.lock().unwrap().settings.insert(user_id, settings);
    }

    pub fn account(&self, user_id: Uuid) -> Option<Account> {
        self.state.lock().unwrap().accounts.get(&user_id).cloned()
    }

    pub fn saved_settings(&self, user_id: Uuid) -> Option<UserSettings> {
        self.state.lock().unwrap().settings.get(&user_id).cloned()
    }

    pub fn processed_jobs(&self) -> Vec<String> {
        let mut keys = self
            .state
            .lock()
            .unwrap()
            .processed_jobs
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    fn update(&self, user_id: Uuid, f: impl FnOnce(&mut Account)) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("no account {}", user_id))?;
        f(account);
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get(&self, user_id: Uuid) -> anyhow::Result<Option<Account>> {
        Ok(self.account(user_id))
    }

    async fn set_history_id(&self, user_id: Uuid, history_id: &str) -> anyhow::Result<()> {
        self.update(user_id, |a| a.history_id = Some(history_id.to_string()))
    }

    async fn set_access_token(&self, user_id: Uuid, access_token: &str) -> anyhow::Result<()> {
        self.update(user_id, |a| a.access_token = Some(access_token.to_string()))
    }

    async fn set_watch(
        &self,
        user_id: Uuid,
        history_id: Option<&str>,
        expiration: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        self.update(user_id, |a| {
            if let Some(history_id) = history_id {
                a.history_id = Some(history_id.to_string());
            }
            a.watch_expiration = expiration;
        })
    }

    async fn connect(
        &self,
        user_id: Uuid,
        email: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<Account> {
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .entry(user_id)
            .or_insert_with(|| Account {
                user_id,
                ..test_account(email)
            });
        account.email = email.to_string();
        account.access_token = Some(access_token.to_string());
        if let Some(refresh_token) = refresh_token {
            account.refresh_token = Some(refresh_token.to_string());
        }
        let account = account.clone();
        state.settings.entry(user_id).or_default();
        Ok(account)
    }

    async fn watches_expiring_before(&self, before: DateTime<Utc>) -> anyhow::Result<Vec<Account>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .filter(|a| a.watch_expiration.is_some_and(|exp| exp < before))
            .cloned()
            .collect())
    }

    async fn settings(&self, user_id: Uuid) -> anyhow::Result<Option<UserSettings>> {
        Ok(self.saved_settings(user_id))
    }

    async fn save_settings(&self, user_id: Uuid, settings: &UserSettings) -> anyhow::Result<()> {
        self.put_settings(user_id, settings.clone());
        Ok(())
    }

    async fn is_job_processed(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.state.lock().unwrap().processed_jobs.contains_key(key))
    }

    async fn mark_job_processed(&self, key: &str, job_type: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .processed_jobs
            .insert(key.to_string(), job_type.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct MailboxState {
    history_pages: VecDeque<ListHistoryResponse>,
    history_error: Option<u16>,
    history_calls: Vec<String>,
    messages: HashMap<String, GmailMessage>,
    message_order: Vec<String>,
    get_calls: usize,
    labels: Vec<Label>,
    labels_created: usize,
    rate_limited: HashSet<String>,
    labelled: Vec<(String, String)>,
    drafts: Vec<RawMessage>,
    sent: Vec<RawMessage>,
    watches: Vec<String>,
    stopped: usize,
}

/// Mailbox kept in memory. History pages are served in the order pushed.
pub struct FakeMailbox {
    email: String,
    state: Mutex<MailboxState>,
}

impl FakeMailbox {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            state: Mutex::new(MailboxState::default()),
        }
    }

    pub fn push_history_page(&self, page: ListHistoryResponse) {
        self.state.lock().unwrap().history_pages.push_back(page);
    }

    /// Every history call fails with the given status
    pub fn fail_history(&self, status: u16) {
        self.state.lock().unwrap().history_error = Some(status);
    }

    /// Start ids of the history calls made so far
    pub fn history_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().history_calls.clone()
    }

    pub fn add_message(&self, id: &str, thread_id: &str, from: &str, subject: &str, body: &str) {
        let message = GmailMessage {
            id: id.to_string(),
            thread_id: Some(thread_id.to_string()),
            label_ids: vec!["INBOX".to_string()],
            snippet: Some(body.chars().take(100).collect()),
            payload: Some(MessagePart {
                mime_type: Some("text/plain".to_string()),
                headers: vec![
                    MessageHeader {
                        name: "From".to_string(),
                        value: from.to_string(),
                    },
                    MessageHeader {
                        name: "Subject".to_string(),
                        value: subject.to_string(),
                    },
                ],
                body: Some(MessagePartBody {
                    data: Some(URL_SAFE.encode(body)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };
        let mut state = self.state.lock().unwrap();
        state.message_order.push(id.to_string());
        state.messages.insert(id.to_string(), message);
    }

    pub fn get_calls(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }

    /// Adds a label as if the user had created it in Gmail
    pub fn seed_label(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push(Label {
            id: Some(id.clone()),
            name: Some(name.to_string()),
            ..Default::default()
        });
        id
    }

    pub fn labels_created(&self) -> usize {
        self.state.lock().unwrap().labels_created
    }

    pub fn label_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .filter_map(|l| l.name.clone())
            .collect()
    }

    pub fn rate_limit_label_on(&self, message_id: &str) {
        self.state.lock().unwrap().rate_limited.insert(message_id.to_string());
    }

    pub fn labelled_messages(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .labelled
            .iter()
            .map(|(message_id, _)| message_id.clone())
            .collect()
    }

    /// (message id, label id) pairs in application order
    pub fn applied_labels(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().labelled.clone()
    }

    pub fn drafts(&self) -> Vec<RawMessage> {
        self.state.lock().unwrap().drafts.clone()
    }

    pub fn sent(&self) -> Vec<RawMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn watches(&self) -> Vec<String> {
        self.state.lock().unwrap().watches.clone()
    }

    pub fn stopped(&self) -> usize {
        self.state.lock().unwrap().stopped
    }
}

#[async_trait]
impl MailProvider for FakeMailbox {
    fn email_address(&self) -> &str {
        &self.email
    }

    async fn list_history(
        &self,
        start_history_id: &str,
        _page_token: Option<&str>,
    ) -> EmailClientResult<ListHistoryResponse> {
        let mut state = self.state.lock().unwrap();
        state.history_calls.push(start_history_id.to_string());
        if let Some(status) = state.history_error {
            return Err(EmailClientError::Api {
                status,
                body: "history unavailable".to_string(),
            });
        }
        Ok(state.history_pages.pop_front().unwrap_or_default())
    }

    async fn get_message(
        &self,
        message_id: &str,
        _format: MessageFormat,
    ) -> EmailClientResult<GmailMessage> {
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;
        state
            .messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| EmailClientError::NotFound(message_id.to_string()))
    }

    async fn list_messages(
        &self,
        options: MessageListOptions,
    ) -> EmailClientResult<ListMessagesResponse> {
        let state = self.state.lock().unwrap();
        let limit = options.max_results.map(|n| n as usize).unwrap_or(usize::MAX);
        let messages = state
            .message_order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.messages.get(id))
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
                label_ids: vec![],
            })
            .collect::<Vec<_>>();
        Ok(ListMessagesResponse {
            result_size_estimate: Some(messages.len() as u32),
            messages,
            next_page_token: None,
        })
    }

    async fn list_labels(&self) -> EmailClientResult<Vec<Label>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str, color: LabelColor) -> EmailClientResult<Label> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.labels.iter().find(|l| l.name.as_deref() == Some(name)) {
            return Ok(existing.clone());
        }
        let label = Label {
            id: Some(format!("Label_{}", state.labels.len() + 1)),
            name: Some(name.to_string()),
            color: Some(color),
            ..Default::default()
        };
        state.labels.push(label.clone());
        state.labels_created += 1;
        Ok(label)
    }

    async fn delete_label(&self, label_id: &str) -> EmailClientResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.labels.len();
        state.labels.retain(|l| l.id.as_deref() != Some(label_id));
        if state.labels.len() == before {
            return Err(EmailClientError::NotFound(label_id.to_string()));
        }
        Ok(())
    }

    async fn add_label(&self, message_id: &str, label_id: &str) -> EmailClientResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.rate_limited.contains(message_id) {
            return Err(EmailClientError::RateLimited);
        }
        state
            .labelled
            .push((message_id.to_string(), label_id.to_string()));
        Ok(())
    }

    async fn create_draft(&self, raw: &str, thread_id: Option<&str>) -> EmailClientResult<Draft> {
        let mut state = self.state.lock().unwrap();
        state.drafts.push(RawMessage {
            raw: raw.to_string(),
            thread_id: thread_id.map(str::to_string),
        });
        Ok(Draft {
            id: format!("r{}", state.drafts.len()),
            message: None,
        })
    }

    async fn send_message(
        &self,
        raw: &str,
        thread_id: Option<&str>,
    ) -> EmailClientResult<MessageRef> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(RawMessage {
            raw: raw.to_string(),
            thread_id: thread_id.map(str::to_string),
        });
        Ok(MessageRef {
            id: format!("s{}", state.sent.len()),
            thread_id: thread_id.map(str::to_string),
            label_ids: vec!["SENT".to_string()],
        })
    }

    async fn watch_mailbox(&self, topic_name: &str) -> EmailClientResult<WatchResponse> {
        self.state.lock().unwrap().watches.push(topic_name.to_string());
        Ok(WatchResponse {
            history_id: "500".to_string(),
            expiration: (Utc::now() + chrono::Duration::days(7))
                .timestamp_millis()
                .to_string(),
        })
    }

    async fn stop_watch(&self) -> EmailClientResult<()> {
        self.state.lock().unwrap().stopped += 1;
        Ok(())
    }

    async fn get_profile(&self) -> EmailClientResult<Profile> {
        Ok(Profile {
            email_address: self.email.clone(),
            history_id: Some("500".to_string()),
            messages_total: None,
        })
    }
}

/// Hands out the registered mailbox for an account's address; accounts
/// without one have no usable credentials.
#[derive(Default)]
pub struct FakeConnector {
    mailboxes: Mutex<HashMap<String, Arc<FakeMailbox>>>,
}

impl FakeConnector {
    pub fn with_mailbox(mailbox: Arc<FakeMailbox>) -> Self {
        let connector = Self::default();
        connector
            .mailboxes
            .lock()
            .unwrap()
            .insert(mailbox.email.to_lowercase(), mailbox);
        connector
    }
}

#[async_trait]
impl MailConnector for FakeConnector {
    async fn connect(&self, account: &Account) -> Option<Arc<dyn MailProvider>> {
        let mailboxes = self.mailboxes.lock().unwrap();
        mailboxes
            .get(&account.email.to_lowercase())
            .map(|m| m.clone() as Arc<dyn MailProvider>)
    }
}

/// Replays canned responses in order, repeating the last one once they run
/// out. With no responses at all every call fails.
#[derive(Default)]
pub struct FakeGenerator {
    responses: Vec<String>,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Every call waits `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str, _temperature: f32) -> anyhow::Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            anyhow::bail!("model unavailable");
        }
        self.responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no canned response"))
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    published: Mutex<Vec<(QueueJob, PublishOptions)>>,
    fail: bool,
}

impl RecordingQueue {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<QueueJob> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(job, _)| job.clone())
            .collect()
    }

    pub fn dedup_ids(&self) -> Vec<Option<String>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, options)| options.deduplication_id.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn publish(&self, job: &QueueJob, options: PublishOptions) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("queue unavailable");
        }
        let mut published = self.published.lock().unwrap();
        published.push((job.clone(), options));
        Ok(format!("msg_{}", published.len()))
    }
}

/// Pipeline options with every wait set to zero
pub fn test_options() -> PipelineOptions {
    PipelineOptions {
        concurrency: 5,
        body_char_limit: 1000,
        label_cooldown: Duration::ZERO,
        history_page_limit: 10,
        classify_temperature: 0.3,
        draft_temperature: 0.7,
        signup: SignupConfig {
            recent_message_count: 50,
            label_settle_ms: 0,
            fetch_settle_ms: 0,
            label_spacing_ms: 0,
            rate_limit_cooldown_ms: 0,
        },
    }
}

/// One account wired to a fake mailbox, model and optional queue
pub struct Harness {
    pub account: Account,
    pub store: Arc<InMemoryStore>,
    pub mailbox: Arc<FakeMailbox>,
    pub generator: Arc<FakeGenerator>,
    pub queue: Option<Arc<RecordingQueue>>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub const EMAIL: &'static str = "ann@example.com";

    pub fn new(generator: FakeGenerator) -> Self {
        Self::build(generator, None)
    }

    pub fn with_queue(generator: FakeGenerator, queue: RecordingQueue) -> Self {
        Self::build(generator, Some(Arc::new(queue)))
    }

    fn build(generator: FakeGenerator, queue: Option<Arc<RecordingQueue>>) -> Self {
        let account = test_account(Self::EMAIL);
        let store = Arc::new(InMemoryStore::with_account(account.clone()));
        let mailbox = Arc::new(FakeMailbox::new(Self::EMAIL));
        let generator = Arc::new(generator);
        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(FakeConnector::with_mailbox(mailbox.clone())),
            generator.clone(),
            queue.clone().map(|q| q as Arc<dyn JobQueue>),
            test_options(),
        );
        Self {
            account,
            store,
            mailbox,
            generator,
            queue,
            pipeline,
        }
    }

    pub fn set_history_id(&self, history_id: &str) {
        let mut account = self.account.clone();
        account.history_id = Some(history_id.to_string());
        self.store.insert_account(account);
    }

    /// Default settings with every built-in label provisioned in the mailbox
    pub async fn provision(&self) -> UserSettings {
        let labels = provision_labels(
            self.mailbox.as_ref(),
            &CategorySet::builtin(),
            &Default::default(),
        )
        .await
        .unwrap();
        let settings = UserSettings {
            labels,
            ..Default::default()
        };
        self.store.put_settings(self.account.user_id, settings.clone());
        settings
    }

    pub fn history_id(&self) -> Option<String> {
        self.store
            .account(self.account.user_id)
            .and_then(|a| a.history_id)
    }
}
