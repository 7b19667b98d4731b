use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use leaky_bucket::RateLimiter;
use tokio::sync::Mutex;

use super::{
    client::{gmail_rate_limiter, EmailClient},
    provider::MailProvider,
};
use crate::{
    auth::google_token::TokenRefresher,
    model::{account::Account, store::AccountStore},
    HttpClient,
};

/// Opens an authenticated mailbox for an account
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// `None` when no working credential can be obtained
    async fn connect(&self, account: &Account) -> Option<Arc<dyn MailProvider>>;
}

const LIMITER_IDLE: Duration = Duration::from_secs(15 * 60);

struct MailboxLimiter {
    limiter: Arc<RateLimiter>,
    last_used: Instant,
}

/// Builds Gmail clients with a refreshed token. Each mailbox keeps one quota
/// bucket across clients; buckets no client holds are dropped once idle.
#[derive(Clone)]
pub struct GmailConnector {
    http_client: HttpClient,
    api_base: String,
    refresher: TokenRefresher,
    store: Arc<dyn AccountStore>,
    limiters: Arc<Mutex<HashMap<String, MailboxLimiter>>>,
    limiter_idle: Duration,
}

impl GmailConnector {
    pub fn new(
        http_client: HttpClient,
        api_base: impl Into<String>,
        refresher: TokenRefresher,
        store: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            refresher,
            store,
            limiters: Arc::new(Mutex::new(HashMap::new())),
            limiter_idle: LIMITER_IDLE,
        }
    }

    async fn limiter_for(&self, email: &str) -> Arc<RateLimiter> {
        let now = Instant::now();
        let mut limiters = self.limiters.lock().await;
        limiters.retain(|_, entry| {
            Arc::strong_count(&entry.limiter) > 1
                || now.duration_since(entry.last_used) < self.limiter_idle
        });

        let entry = limiters
            .entry(email.to_lowercase())
            .or_insert_with(|| MailboxLimiter {
                limiter: gmail_rate_limiter(),
                last_used: now,
            });
        entry.last_used = now;
        entry.limiter.clone()
    }
}

#[async_trait]
impl MailConnector for GmailConnector {
    async fn connect(&self, account: &Account) -> Option<Arc<dyn MailProvider>> {
        let access_token = self
            .refresher
            .valid_access_token(self.store.as_ref(), account)
            .await?;
        let rate_limiter = self.limiter_for(&account.email).await;

        Some(Arc::new(EmailClient::new(
            self.http_client.clone(),
            self.api_base.clone(),
            access_token,
            account.email.clone(),
            rate_limiter,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fakes::{test_account, InMemoryStore};

    #[tokio::test]
    async fn test_limiter_is_shared_per_mailbox() {
        let http_client = HttpClient::new();
        let connector = GmailConnector::new(
            http_client.clone(),
            "http://localhost:1",
            TokenRefresher::new(http_client, "http://localhost:1", "http://localhost:1", "id", "secret"),
            Arc::new(InMemoryStore::default()),
        );
        let a = connector.limiter_for("Ann@Example.com").await;
        let b = connector.limiter_for("ann@example.com").await;
        let c = connector.limiter_for("bob@example.com").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_idle_limiters_are_evicted() {
        let http_client = HttpClient::new();
        let mut connector = GmailConnector::new(
            http_client.clone(),
            "http://localhost:1",
            TokenRefresher::new(http_client, "http://localhost:1", "http://localhost:1", "id", "secret"),
            Arc::new(InMemoryStore::default()),
        );
        connector.limiter_idle = Duration::ZERO;

        let held = connector.limiter_for("ann@example.com").await;
        drop(connector.limiter_for("bob@example.com").await);
        connector.limiter_for("cid@example.com").await;

        let limiters = connector.limiters.lock().await;
        assert!(limiters.contains_key("ann@example.com"));
        assert!(!limiters.contains_key("bob@example.com"));
        assert_eq!(limiters.len(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn test_account_without_tokens_cannot_connect() {
        let http_client = HttpClient::new();
        let connector = GmailConnector::new(
            http_client.clone(),
            "http://localhost:1",
            TokenRefresher::new(http_client, "http://localhost:1", "http://localhost:1", "id", "secret"),
            Arc::new(InMemoryStore::default()),
        );
        assert!(connector.connect(&test_account("ann@example.com")).await.is_none());
    }
}
