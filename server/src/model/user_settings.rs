use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::{db_core::prelude::*, error::AppResult};

use super::settings::{DraftSettings, UserSettings};

pub struct UserSettingsCtrl;

impl UserSettingsCtrl {
    pub async fn get(conn: &DatabaseConnection, user_id: Uuid) -> AppResult<Option<UserSettings>> {
        let model = user_settings::Entity::find_by_id(user_id)
            .one(conn)
            .await
            .context("Error fetching user settings")?;

        Ok(model.map(UserSettings::from))
    }

    pub async fn upsert(
        conn: &DatabaseConnection,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> AppResult<()> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let active = user_settings::ActiveModel {
            user_id: ActiveValue::Set(user_id),
            auto_categorize_enabled: ActiveValue::Set(settings.auto_categorize_enabled),
            auto_label_enabled: ActiveValue::Set(settings.auto_label_enabled),
            auto_draft_enabled: ActiveValue::Set(settings.auto_draft_enabled),
            labels: ActiveValue::Set(serde_json::to_value(&settings.labels).context("labels")?),
            label_customization: ActiveValue::Set(
                serde_json::to_value(&settings.label_customization).context("customization")?,
            ),
            draft_settings: ActiveValue::Set(
                serde_json::to_value(&settings.draft_settings).context("draft settings")?,
            ),
            draft_language: ActiveValue::Set(settings.draft_language.clone()),
            draft_tone: ActiveValue::Set(settings.draft_tone.clone()),
            custom_instructions: ActiveValue::Set(settings.custom_instructions.clone()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };

        user_settings::Entity::insert(active)
            .on_conflict(
                OnConflict::column(user_settings::Column::UserId)
                    .update_columns([
                        user_settings::Column::AutoCategorizeEnabled,
                        user_settings::Column::AutoLabelEnabled,
                        user_settings::Column::AutoDraftEnabled,
                        user_settings::Column::Labels,
                        user_settings::Column::LabelCustomization,
                        user_settings::Column::DraftSettings,
                        user_settings::Column::DraftLanguage,
                        user_settings::Column::DraftTone,
                        user_settings::Column::CustomInstructions,
                        user_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(conn)
            .await
            .context("Error saving user settings")?;

        Ok(())
    }
}

fn json_or_default<T: DeserializeOwned + Default>(value: serde_json::Value, column: &str) -> T {
    if value.is_null() {
        return T::default();
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("Unreadable {} column, using empty value: {}", column, e);
        T::default()
    })
}

impl From<user_settings::Model> for UserSettings {
    fn from(model: user_settings::Model) -> Self {
        UserSettings {
            auto_categorize_enabled: model.auto_categorize_enabled,
            auto_label_enabled: model.auto_label_enabled,
            auto_draft_enabled: model.auto_draft_enabled,
            labels: json_or_default(model.labels, "labels"),
            label_customization: json_or_default(model.label_customization, "label_customization"),
            draft_settings: DraftSettings::from_stored(&model.draft_settings),
            draft_language: model.draft_language,
            draft_tone: model.draft_tone,
            custom_instructions: model.custom_instructions,
        }
    }
}
