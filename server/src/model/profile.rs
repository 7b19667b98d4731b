use anyhow::Context;
use chrono::{DateTime, Utc};
use lib_utils::crypt;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
};

use super::account::Account;

pub struct ProfileCtrl;

impl ProfileCtrl {
    pub async fn find_by_email(
        conn: &DatabaseConnection,
        email: &str,
    ) -> AppResult<Option<profile::Model>> {
        let profile = profile::Entity::find()
            .filter(profile::Column::Email.eq(email.to_lowercase()))
            .one(conn)
            .await
            .context("Error fetching profile by email")?;

        Ok(profile)
    }

    pub async fn find_by_id(
        conn: &DatabaseConnection,
        user_id: Uuid,
    ) -> AppResult<Option<profile::Model>> {
        let profile = profile::Entity::find_by_id(user_id)
            .one(conn)
            .await
            .context("Error fetching profile by id")?;

        Ok(profile)
    }

    pub async fn get_by_id(conn: &DatabaseConnection, user_id: Uuid) -> AppResult<profile::Model> {
        Self::find_by_id(conn, user_id)
            .await?
            .ok_or(AppError::NotFound("Profile not found".to_string()))
    }

    pub async fn set_history_id(
        conn: &DatabaseConnection,
        user_id: Uuid,
        history_id: &str,
    ) -> AppResult<()> {
        profile::Entity::update_many()
            .col_expr(profile::Column::GmailHistoryId, Expr::value(history_id))
            .col_expr(profile::Column::UpdatedAt, Expr::value(now()))
            .filter(profile::Column::Id.eq(user_id))
            .exec(conn)
            .await
            .context("Error updating history id")?;

        Ok(())
    }

    pub async fn set_access_token(
        conn: &DatabaseConnection,
        user_id: Uuid,
        access_token: &str,
    ) -> AppResult<()> {
        let encrypted = crypt::encrypt(access_token)?;
        profile::Entity::update_many()
            .col_expr(profile::Column::GoogleAccessToken, Expr::value(encrypted))
            .col_expr(profile::Column::UpdatedAt, Expr::value(now()))
            .filter(profile::Column::Id.eq(user_id))
            .exec(conn)
            .await
            .context("Error storing access token")?;

        Ok(())
    }

    pub async fn set_watch(
        conn: &DatabaseConnection,
        user_id: Uuid,
        history_id: Option<&str>,
        expiration: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut update = profile::Entity::update_many();
        if let Some(history_id) = history_id {
            update = update.col_expr(profile::Column::GmailHistoryId, Expr::value(history_id));
        }
        update
            .col_expr(
                profile::Column::WatchExpiration,
                Expr::value(expiration.map(DateTimeWithTimeZone::from)),
            )
            .col_expr(profile::Column::UpdatedAt, Expr::value(now()))
            .filter(profile::Column::Id.eq(user_id))
            .exec(conn)
            .await
            .context("Error storing watch")?;

        Ok(())
    }

    /// Stores fresh OAuth tokens, creating the profile on first connect. A
    /// missing refresh token keeps the one already stored.
    pub async fn upsert_tokens(
        conn: &DatabaseConnection,
        user_id: Uuid,
        email: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<profile::Model> {
        let access_token = crypt::encrypt(access_token)?;
        let refresh_token = refresh_token.map(crypt::encrypt).transpose()?;
        let now = now();

        match Self::find_by_id(conn, user_id).await? {
            Some(existing) => {
                let mut active: profile::ActiveModel = existing.into();
                active.email = ActiveValue::Set(email.to_lowercase());
                active.google_access_token = ActiveValue::Set(Some(access_token));
                if let Some(refresh_token) = refresh_token {
                    active.google_refresh_token = ActiveValue::Set(Some(refresh_token));
                }
                active.updated_at = ActiveValue::Set(now);
                let updated = active
                    .update(conn)
                    .await
                    .context("Error updating profile tokens")?;
                Ok(updated)
            }
            None => {
                let active = profile::ActiveModel {
                    id: ActiveValue::Set(user_id),
                    email: ActiveValue::Set(email.to_lowercase()),
                    google_access_token: ActiveValue::Set(Some(access_token)),
                    google_refresh_token: ActiveValue::Set(refresh_token),
                    gmail_history_id: ActiveValue::Set(None),
                    watch_expiration: ActiveValue::Set(None),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                let inserted = active
                    .insert(conn)
                    .await
                    .map_err(|e| {
                        if crate::error::is_unique_violation(&e) {
                            AppError::Conflict("Email is connected to another account".to_string())
                        } else {
                            AppError::DbError(e)
                        }
                    })?;
                Ok(inserted)
            }
        }
    }

    pub async fn with_watch_expiring_before(
        conn: &DatabaseConnection,
        before: DateTime<Utc>,
    ) -> AppResult<Vec<profile::Model>> {
        let profiles = profile::Entity::find()
            .filter(profile::Column::WatchExpiration.is_not_null())
            .filter(profile::Column::WatchExpiration.lt(DateTimeWithTimeZone::from(before)))
            .filter(profile::Column::GoogleRefreshToken.is_not_null())
            .all(conn)
            .await
            .context("Error fetching expiring watches")?;

        Ok(profiles)
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

fn decrypt_token(token: Option<String>) -> AppResult<Option<String>> {
    Ok(token.map(|t| crypt::decrypt(&t)).transpose()?)
}

impl TryFrom<profile::Model> for Account {
    type Error = AppError;

    fn try_from(model: profile::Model) -> Result<Self, Self::Error> {
        Ok(Account {
            user_id: model.id,
            email: model.email,
            access_token: decrypt_token(model.google_access_token)?,
            refresh_token: decrypt_token(model.google_refresh_token)?,
            history_id: model.gmail_history_id,
            watch_expiration: model.watch_expiration.map(|d| d.with_timezone(&Utc)),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}
