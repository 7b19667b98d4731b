use anyhow::Context;
use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult};

pub struct ProcessedJobCtrl;

impl ProcessedJobCtrl {
    pub async fn exists(conn: &DatabaseConnection, key: &str) -> AppResult<bool> {
        let found = processed_job::Entity::find_by_id(key.to_string())
            .one(conn)
            .await
            .context("Error checking processed job")?;

        Ok(found.is_some())
    }

    pub async fn record(conn: &DatabaseConnection, key: &str, job_type: &str) -> AppResult<()> {
        let active = processed_job::ActiveModel {
            key: ActiveValue::Set(key.to_string()),
            job_type: ActiveValue::Set(job_type.to_string()),
            processed_at: ActiveValue::Set(Utc::now().into()),
        };

        let result = processed_job::Entity::insert(active)
            .on_conflict(
                OnConflict::column(processed_job::Column::Key)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(conn)
            .await;

        match result {
            Ok(_) | Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e).context("Error recording processed job")?,
        }
    }
}
