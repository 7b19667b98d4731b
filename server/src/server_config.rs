use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, time::Duration};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on in-flight per-message Gmail/model calls
    pub concurrency: usize,
    pub body_char_limit: usize,
    pub label_cooldown_ms: u64,
    pub history_page_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            body_char_limit: 1000,
            label_cooldown_ms: 2000,
            history_page_limit: 10,
        }
    }
}

impl PipelineConfig {
    pub fn bounded_concurrency(&self) -> usize {
        self.concurrency.clamp(1, 10)
    }

    pub fn label_cooldown(&self) -> Duration {
        Duration::from_millis(self.label_cooldown_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub api_base: String,
    pub classify_temperature: f32,
    pub draft_temperature: f32,
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub api_base: String,
    pub token_uri: String,
    pub topic_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub api_base: String,
    pub retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignupConfig {
    pub recent_message_count: u32,
    pub label_settle_ms: u64,
    pub fetch_settle_ms: u64,
    pub label_spacing_ms: u64,
    pub rate_limit_cooldown_ms: u64,
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            recent_message_count: 50,
            label_settle_ms: 1000,
            fetch_settle_ms: 500,
            label_spacing_ms: 100,
            rate_limit_cooldown_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub renew_cron: String,
    pub expiring_within_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    pipeline: PipelineConfig,
    model: ModelConfig,
    gmail: GmailConfig,
    queue: QueueConfig,
    signup: SignupConfig,
    watch: WatchConfig,
    http: HttpConfig,
}

/// Present only when the queue token and both signing keys are set
#[derive(Clone)]
pub struct QueueSecrets {
    pub token: String,
    pub current_signing_key: String,
    pub next_signing_key: String,
}

#[derive(Clone)]
pub struct Secrets {
    pub gemini_api_key: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub queue: Option<QueueSecrets>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("google_client_id", &self.google_client_id)
            .field("queue_enabled", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    pub gmail: GmailConfig,
    pub queue: QueueConfig,
    pub signup: SignupConfig,
    pub watch: WatchConfig,
    pub http: HttpConfig,
    pub app_url: Url,
    pub secrets: Secrets,
}

impl ServerConfig {
    /// Public URL the queue delivers jobs to
    pub fn worker_url(&self) -> String {
        let mut url = self.app_url.clone();
        url.set_path("/api/queue/worker");
        url.to_string()
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\nPipeline: {:?}\n\nModel: {:?}\n\nGmail: {:?}\n\nQueue: {:?} (enabled: {})\n\nSignup: {:?}\n\nWatch: {:?}\n\nApp URL: {}",
            self.pipeline,
            self.model,
            self.gmail,
            self.queue,
            self.secrets.queue.is_some(),
            self.signup,
            self.watch,
            self.app_url,
        )
    }
}

fn config_root() -> String {
    env::var("APP_DIR").unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        let parent = Path::new(&dir)
            .parent()
            .expect("Failed to get parent dir")
            .display()
            .to_string();
        format!("{}/config", parent)
    })
}

fn required(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} is required"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let path = format!("{}/config.toml", config_root());
        let ConfigFile {
            pipeline,
            model,
            gmail,
            queue,
            signup,
            watch,
            http,
        } = Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(config::Environment::with_prefix("FLOBASE").separator("__"))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        let queue_secrets = match (
            optional("QSTASH_TOKEN"),
            optional("QSTASH_CURRENT_SIGNING_KEY"),
            optional("QSTASH_NEXT_SIGNING_KEY"),
        ) {
            (Some(token), Some(current_signing_key), Some(next_signing_key)) => Some(QueueSecrets {
                token,
                current_signing_key,
                next_signing_key,
            }),
            _ => None,
        };

        ServerConfig {
            pipeline,
            model,
            gmail,
            queue,
            signup,
            watch,
            http,
            app_url: Url::parse(&required("APP_URL")).expect("APP_URL is invalid"),
            secrets: Secrets {
                gemini_api_key: required("GEMINI_API_KEY"),
                google_client_id: required("GOOGLE_CLIENT_ID"),
                google_client_secret: required("GOOGLE_CLIENT_SECRET"),
                queue: queue_secrets,
            },
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_is_bounded() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.bounded_concurrency(), 5);
        pipeline.concurrency = 0;
        assert_eq!(pipeline.bounded_concurrency(), 1);
        pipeline.concurrency = 64;
        assert_eq!(pipeline.bounded_concurrency(), 10);
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = format!("{}/../config/config.toml", env!("CARGO_MANIFEST_DIR"));
        let file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(file.pipeline.body_char_limit, 1000);
        assert_eq!(file.model.id, "gemini-2.5-flash");
        assert!((file.model.classify_temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(file.queue.retries, 3);
        assert_eq!(file.signup.recent_message_count, 50);
    }
}
