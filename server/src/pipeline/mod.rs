//! Webhook and queue driven mail processing: change-set resolution,
//! classification, labelling and reply drafting.

use std::{sync::Arc, time::Duration};

use crate::{
    email::connector::MailConnector,
    model::store::AccountStore,
    prompt::TextGenerator,
    queue::JobQueue,
    server_config::{cfg, SignupConfig},
};

pub mod drafts;
pub mod fetch;
pub mod labels;
pub mod notification;
pub mod signup;
pub mod watch;

pub use notification::NotificationOutcome;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency: usize,
    pub body_char_limit: usize,
    pub label_cooldown: Duration,
    pub history_page_limit: usize,
    pub classify_temperature: f32,
    pub draft_temperature: f32,
    pub signup: SignupConfig,
}

impl PipelineOptions {
    pub fn from_config() -> Self {
        Self {
            concurrency: cfg.pipeline.bounded_concurrency(),
            body_char_limit: cfg.pipeline.body_char_limit,
            label_cooldown: cfg.pipeline.label_cooldown(),
            history_page_limit: cfg.pipeline.history_page_limit.max(1),
            classify_temperature: cfg.model.classify_temperature,
            draft_temperature: cfg.model.draft_temperature,
            signup: cfg.signup.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn AccountStore>,
    pub connector: Arc<dyn MailConnector>,
    pub generator: Arc<dyn TextGenerator>,
    /// Drafts are generated inline when no queue is configured
    pub queue: Option<Arc<dyn JobQueue>>,
    pub options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn AccountStore>,
        connector: Arc<dyn MailConnector>,
        generator: Arc<dyn TextGenerator>,
        queue: Option<Arc<dyn JobQueue>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            connector,
            generator,
            queue,
            options,
        }
    }
}
