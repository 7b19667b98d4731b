use std::sync::Arc;

use axum::{extract::State, Json};
use lib_email_clients::gmail::label_colors::PaletteColor;
use serde::{Deserialize, Serialize};

use super::common::{user_mailbox, user_settings};
use crate::{
    auth::jwt::Claims,
    email::{client::EmailClientError, connector::MailConnector},
    error::{AppError, AppJsonResult},
    model::{
        category::{custom_label_key, CategorySet},
        settings::{CustomizationRecord, CustomizationRules, LabelConfig, LabelsRecord},
        store::AccountStore,
    },
};

#[derive(Debug, Serialize)]
pub struct LabelsResponse {
    labels: LabelsRecord,
    customization: CustomizationRecord,
}

/// # GET /api/labels
pub async fn list(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
) -> AppJsonResult<LabelsResponse> {
    let settings = user_settings(store.as_ref(), claims.sub).await?;
    Ok(Json(LabelsResponse {
        labels: settings.labels,
        customization: settings.label_customization,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateLabelBody {
    name: String,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabelResponse {
    success: bool,
    label_key: String,
    label: LabelConfig,
}

/// # POST /api/labels/create
pub async fn create(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
    Json(CreateLabelBody { name, color }): Json<CreateLabelBody>,
) -> AppJsonResult<CreateLabelResponse> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Label name is required".to_string()));
    }
    let key = custom_label_key(&name);
    let mut settings = user_settings(store.as_ref(), claims.sub).await?;
    if settings.labels.contains_key(&key) || CategorySet::builtin().contains(&key.to_uppercase()) {
        return Err(AppError::Conflict(format!("Label {} already exists", name)));
    }

    let color = PaletteColor::from_name(color.as_deref().unwrap_or_default());
    let (_, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    let created = mailbox.create_label(&name, color.label_color()).await?;
    let id = created
        .id
        .ok_or_else(|| AppError::Upstream("Gmail returned a label without id".to_string()))?;

    let label = LabelConfig {
        id,
        name,
        color: color.to_string(),
        enabled: true,
        is_custom: true,
    };
    settings.labels.insert(key.clone(), label.clone());
    store.save_settings(claims.sub, &settings).await?;
    tracing::info!("User {} created label {} ({})", claims.sub, key, label.id);

    Ok(Json(CreateLabelResponse {
        success: true,
        label_key: key,
        label,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelKeyBody {
    label_key: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    success: bool,
}

/// # DELETE /api/labels/delete
pub async fn delete(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    State(connector): State<Arc<dyn MailConnector>>,
    Json(LabelKeyBody { label_key }): Json<LabelKeyBody>,
) -> AppJsonResult<SuccessResponse> {
    let mut settings = user_settings(store.as_ref(), claims.sub).await?;
    let label = settings
        .labels
        .get(&label_key)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Label {} not found", label_key)))?;

    let (_, mailbox) = user_mailbox(store.as_ref(), connector.as_ref(), claims.sub).await?;
    match mailbox.delete_label(&label.id).await {
        Ok(()) => {}
        Err(EmailClientError::NotFound(_)) => {
            tracing::info!("Gmail label {} was already gone", label.id);
        }
        Err(e) => return Err(e.into()),
    }

    settings.labels.shift_remove(&label_key);
    settings.label_customization.shift_remove(&label_key);
    store.save_settings(claims.sub, &settings).await?;
    tracing::info!("User {} deleted label {}", claims.sub, label_key);

    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBody {
    label_key: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    success: bool,
    label_key: String,
    enabled: bool,
}

/// # PATCH /api/labels/toggle
pub async fn toggle(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    Json(ToggleBody { label_key, enabled }): Json<ToggleBody>,
) -> AppJsonResult<ToggleResponse> {
    let mut settings = user_settings(store.as_ref(), claims.sub).await?;
    let label = settings
        .labels
        .get_mut(&label_key)
        .ok_or_else(|| AppError::NotFound(format!("Label {} not found", label_key)))?;
    label.enabled = enabled;
    store.save_settings(claims.sub, &settings).await?;

    Ok(Json(ToggleResponse {
        success: true,
        label_key,
        enabled,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizeBody {
    label_key: String,
    rules: CustomizationRules,
}

/// # PUT /api/labels/customize
pub async fn customize(
    claims: Claims,
    State(store): State<Arc<dyn AccountStore>>,
    Json(CustomizeBody { label_key, rules }): Json<CustomizeBody>,
) -> AppJsonResult<SuccessResponse> {
    let mut settings = user_settings(store.as_ref(), claims.sub).await?;
    if !settings.labels.contains_key(&label_key) && !CategorySet::builtin().contains(&label_key) {
        return Err(AppError::NotFound(format!("Label {} not found", label_key)));
    }

    if rules.is_empty() {
        settings.label_customization.shift_remove(&label_key);
    } else {
        settings.label_customization.insert(label_key, rules);
    }
    store.save_settings(claims.sub, &settings).await?;

    Ok(Json(SuccessResponse { success: true }))
}
