use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use super::{
    account::Account, processed_job::ProcessedJobCtrl, profile::ProfileCtrl,
    settings::UserSettings, user_settings::UserSettingsCtrl,
};

/// Persistence the mail pipeline depends on
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>>;

    async fn get(&self, user_id: Uuid) -> anyhow::Result<Option<Account>>;

    async fn set_history_id(&self, user_id: Uuid, history_id: &str) -> anyhow::Result<()>;

    async fn set_access_token(&self, user_id: Uuid, access_token: &str) -> anyhow::Result<()>;

    /// `None` for `history_id` leaves the stored cursor untouched
    async fn set_watch(
        &self,
        user_id: Uuid,
        history_id: Option<&str>,
        expiration: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    async fn connect(
        &self,
        user_id: Uuid,
        email: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<Account>;

    async fn watches_expiring_before(&self, before: DateTime<Utc>) -> anyhow::Result<Vec<Account>>;

    /// `None` when the user never saved settings
    async fn settings(&self, user_id: Uuid) -> anyhow::Result<Option<UserSettings>>;

    async fn save_settings(&self, user_id: Uuid, settings: &UserSettings) -> anyhow::Result<()>;

    async fn is_job_processed(&self, key: &str) -> anyhow::Result<bool>;

    async fn mark_job_processed(&self, key: &str, job_type: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct DbAccountStore {
    conn: DatabaseConnection,
}

impl DbAccountStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AccountStore for DbAccountStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let profile = ProfileCtrl::find_by_email(&self.conn, email).await?;
        Ok(profile.map(Account::try_from).transpose()?)
    }

    async fn get(&self, user_id: Uuid) -> anyhow::Result<Option<Account>> {
        let profile = ProfileCtrl::find_by_id(&self.conn, user_id).await?;
        Ok(profile.map(Account::try_from).transpose()?)
    }

    async fn set_history_id(&self, user_id: Uuid, history_id: &str) -> anyhow::Result<()> {
        Ok(ProfileCtrl::set_history_id(&self.conn, user_id, history_id).await?)
    }

    async fn set_access_token(&self, user_id: Uuid, access_token: &str) -> anyhow::Result<()> {
        Ok(ProfileCtrl::set_access_token(&self.conn, user_id, access_token).await?)
    }

    async fn set_watch(
        &self,
        user_id: Uuid,
        history_id: Option<&str>,
        expiration: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        Ok(ProfileCtrl::set_watch(&self.conn, user_id, history_id, expiration).await?)
    }

    async fn connect(
        &self,
        user_id: Uuid,
        email: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<Account> {
        let profile =
            ProfileCtrl::upsert_tokens(&self.conn, user_id, email, access_token, refresh_token)
                .await?;
        if UserSettingsCtrl::get(&self.conn, user_id).await?.is_none() {
            UserSettingsCtrl::upsert(&self.conn, user_id, &UserSettings::default()).await?;
        }
        Ok(Account::try_from(profile)?)
    }

    async fn watches_expiring_before(&self, before: DateTime<Utc>) -> anyhow::Result<Vec<Account>> {
        ProfileCtrl::with_watch_expiring_before(&self.conn, before)
            .await?
            .into_iter()
            .map(|p| Account::try_from(p).map_err(anyhow::Error::from))
            .collect()
    }

    async fn settings(&self, user_id: Uuid) -> anyhow::Result<Option<UserSettings>> {
        Ok(UserSettingsCtrl::get(&self.conn, user_id).await?)
    }

    async fn save_settings(&self, user_id: Uuid, settings: &UserSettings) -> anyhow::Result<()> {
        Ok(UserSettingsCtrl::upsert(&self.conn, user_id, settings).await?)
    }

    async fn is_job_processed(&self, key: &str) -> anyhow::Result<bool> {
        Ok(ProcessedJobCtrl::exists(&self.conn, key).await?)
    }

    async fn mark_job_processed(&self, key: &str, job_type: &str) -> anyhow::Result<()> {
        Ok(ProcessedJobCtrl::record(&self.conn, key, job_type).await?)
    }
}
