use std::sync::Arc;

use uuid::Uuid;

use crate::{
    email::{connector::MailConnector, provider::MailProvider},
    error::{AppError, AppResult},
    model::{account::Account, settings::UserSettings, store::AccountStore},
};

pub async fn user_account(store: &dyn AccountStore, user_id: Uuid) -> AppResult<Account> {
    store
        .get(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No connected Gmail account".to_string()))
}

/// Account plus an authenticated mailbox, refreshing the token if needed
pub async fn user_mailbox(
    store: &dyn AccountStore,
    connector: &dyn MailConnector,
    user_id: Uuid,
) -> AppResult<(Account, Arc<dyn MailProvider>)> {
    let account = user_account(store, user_id).await?;
    let mailbox = connector.connect(&account).await.ok_or_else(|| {
        AppError::Unauthorized("Gmail access has expired, please reconnect".to_string())
    })?;
    Ok((account, mailbox))
}

/// Stored settings, or the defaults for a user who never saved any
pub async fn user_settings(store: &dyn AccountStore, user_id: Uuid) -> AppResult<UserSettings> {
    Ok(store.settings(user_id).await?.unwrap_or_default())
}
