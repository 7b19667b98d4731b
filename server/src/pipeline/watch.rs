use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    email::{connector::MailConnector, provider::MailProvider},
    model::{account::Account, store::AccountStore},
};

/// Pub/Sub topic Gmail publishes mailbox changes to
#[derive(Debug, Clone)]
pub struct WatchTopic(pub String);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRegistration {
    pub history_id: String,
    pub expiration: Option<DateTime<Utc>>,
    pub days_until_expiration: Option<i64>,
}

fn parse_expiration(millis: &str) -> Option<DateTime<Utc>> {
    millis
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// Starts (or renews) push notifications for the mailbox. The returned
/// history id becomes the cursor only when the account has none yet;
/// afterwards only notifications move it.
pub async fn register_watch(
    store: &dyn AccountStore,
    mailbox: &dyn MailProvider,
    account: &Account,
    topic: &WatchTopic,
) -> anyhow::Result<WatchRegistration> {
    let response = mailbox.watch_mailbox(&topic.0).await?;
    let expiration = parse_expiration(&response.expiration);
    let baseline = match account.history_id {
        Some(_) => None,
        None => Some(response.history_id.as_str()),
    };
    store.set_watch(account.user_id, baseline, expiration).await?;
    tracing::info!(
        "Watch registered for {} at history {}, expires {:?}",
        account.email,
        response.history_id,
        expiration
    );

    Ok(WatchRegistration {
        history_id: response.history_id,
        expiration,
        days_until_expiration: expiration.map(|exp| (exp - Utc::now()).num_days()),
    })
}

/// Re-registers every watch that lapses within `within`. Returns how many
/// were renewed.
pub async fn renew_expiring_watches(
    store: &dyn AccountStore,
    connector: &dyn MailConnector,
    topic: &WatchTopic,
    within: chrono::Duration,
) -> anyhow::Result<usize> {
    let accounts = store.watches_expiring_before(Utc::now() + within).await?;
    let mut renewed = 0;
    for account in accounts {
        let Some(mailbox) = connector.connect(&account).await else {
            tracing::warn!("Cannot renew watch for {}: no usable credential", account.email);
            continue;
        };
        match register_watch(store, mailbox.as_ref(), &account, topic).await {
            Ok(_) => renewed += 1,
            Err(e) => tracing::error!("Failed to renew watch for {}: {:?}", account.email, e),
        }
    }
    Ok(renewed)
}
