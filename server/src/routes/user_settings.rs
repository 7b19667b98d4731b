use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::common::user_settings;
use crate::{
    auth::jwt::Claims,
    error::{AppError, AppJsonResult},
    model::{
        settings::{DraftSettings, DraftTone},
        store::AccountStore,
    },
};

#[derive(Debug, Serialize, Deserialize)]
pub struct DraftSettingsEnvelope {
    settings: DraftSettings,
}

/// # GET /api/user/draft-settings
pub async fn get_draft_settings(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
) -> AppJsonResult<DraftSettingsEnvelope> {
    let settings = user_settings(store.as_ref(), claims.sub).await?;
    Ok(Json(DraftSettingsEnvelope {
        settings: settings.draft_settings,
    }))
}

#[derive(Debug, Serialize)]
pub struct SavedDraftSettings {
    success: bool,
    settings: DraftSettings,
}

/// # POST /api/user/draft-settings
pub async fn save_draft_settings(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    Json(DraftSettingsEnvelope { settings: draft_settings }): Json<DraftSettingsEnvelope>,
) -> AppJsonResult<SavedDraftSettings> {
    let draft_settings = draft_settings.normalized();
    let mut settings = user_settings(store.as_ref(), claims.sub).await?;
    settings.draft_settings = draft_settings.clone();
    store.save_settings(claims.sub, &settings).await?;

    Ok(Json(SavedDraftSettings {
        success: true,
        settings: draft_settings,
    }))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draft_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draft_tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auto_categorize_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auto_label_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auto_draft_enabled: Option<bool>,
}

/// # GET /api/user/settings
pub async fn get_settings(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
) -> AppJsonResult<AccountSettings> {
    let settings = user_settings(store.as_ref(), claims.sub).await?;
    Ok(Json(AccountSettings {
        draft_language: settings.draft_language,
        draft_tone: settings.draft_tone,
        custom_instructions: settings.custom_instructions,
        auto_categorize_enabled: Some(settings.auto_categorize_enabled),
        auto_label_enabled: Some(settings.auto_label_enabled),
        auto_draft_enabled: Some(settings.auto_draft_enabled),
    }))
}

/// # PUT /api/user/settings
///
/// Only the fields present in the body are changed
pub async fn update_settings(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    Json(update): Json<AccountSettings>,
) -> AppJsonResult<AccountSettings> {
    if let Some(tone) = update.draft_tone.as_deref() {
        tone.parse::<DraftTone>()
            .map_err(|_| AppError::BadRequest(format!("Unknown draft tone: {}", tone)))?;
    }

    let mut settings = user_settings(store.as_ref(), claims.sub).await?;
    if let Some(language) = update.draft_language {
        settings.draft_language = Some(language);
    }
    if let Some(tone) = update.draft_tone {
        settings.draft_tone = Some(tone);
    }
    if let Some(instructions) = update.custom_instructions {
        settings.custom_instructions = Some(instructions);
    }
    if let Some(enabled) = update.auto_categorize_enabled {
        settings.auto_categorize_enabled = enabled;
    }
    if let Some(enabled) = update.auto_label_enabled {
        settings.auto_label_enabled = enabled;
    }
    if let Some(enabled) = update.auto_draft_enabled {
        settings.auto_draft_enabled = enabled;
    }
    store.save_settings(claims.sub, &settings).await?;

    get_settings(claims, State(store)).await
}
