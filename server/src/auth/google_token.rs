use derive_more::derive::Display;
use serde::Deserialize;

use crate::{
    model::{account::Account, store::AccountStore},
    server_config::cfg,
    HttpClient,
};

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OauthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenEndpointResponse {
    Success(RefreshTokenResponse),
    Error(OauthErrorResponse),
}

#[derive(Debug, Display)]
pub enum RefreshError {
    #[display("Refresh token has been expired or revoked")]
    ExpiredOrRevoked,
    #[display("Token endpoint error: {_0}")]
    Rejected(String),
    #[display("Token endpoint unreachable: {_0}")]
    Transport(String),
}

impl std::error::Error for RefreshError {}

/// Hands out a working Google access token for an account, exchanging the
/// refresh token when the cached one no longer works
#[derive(Clone)]
pub struct TokenRefresher {
    http_client: HttpClient,
    gmail_api_base: String,
    token_uri: String,
    client_id: String,
    client_secret: String,
}

impl TokenRefresher {
    pub fn new(
        http_client: HttpClient,
        gmail_api_base: impl Into<String>,
        token_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            gmail_api_base: gmail_api_base.into(),
            token_uri: token_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_config(http_client: HttpClient) -> Self {
        Self::new(
            http_client,
            cfg.gmail.api_base.clone(),
            cfg.gmail.token_uri.clone(),
            cfg.secrets.google_client_id.clone(),
            cfg.secrets.google_client_secret.clone(),
        )
    }

    /// Cheap authenticated call used to check a cached token
    async fn probe(&self, access_token: &str) -> bool {
        let url = format!("{}/profile", self.gmail_api_base.trim_end_matches('/'));
        match self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!("Profile probe failed: {:?}", e);
                false
            }
        }
    }

    pub async fn exchange(&self, refresh_token: &str) -> Result<RefreshTokenResponse, RefreshError> {
        let resp = self
            .http_client
            .post(&self.token_uri)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let body = resp
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|e| RefreshError::Rejected(e.to_string()))?;

        match body {
            TokenEndpointResponse::Success(token) => Ok(token),
            TokenEndpointResponse::Error(err) if err.error == "invalid_grant" => {
                tracing::info!(
                    "Refresh rejected: {}",
                    err.error_description.as_deref().unwrap_or(&err.error)
                );
                Err(RefreshError::ExpiredOrRevoked)
            }
            TokenEndpointResponse::Error(err) => Err(RefreshError::Rejected(
                err.error_description.unwrap_or(err.error),
            )),
        }
    }

    /// `None` means the account has no usable credential and its unit of
    /// work should be abandoned
    pub async fn valid_access_token(
        &self,
        store: &dyn AccountStore,
        account: &Account,
    ) -> Option<String> {
        if let Some(token) = account.access_token.as_deref() {
            if self.probe(token).await {
                return Some(token.to_string());
            }
        }

        let Some(refresh_token) = account.refresh_token.as_deref() else {
            tracing::warn!("No refresh token stored for user {}", account.user_id);
            return None;
        };

        let refreshed = match self.exchange(refresh_token).await {
            Ok(resp) => resp.access_token,
            Err(e) => {
                tracing::error!("Token refresh failed for user {}: {}", account.user_id, e);
                return None;
            }
        };

        if let Err(e) = store.set_access_token(account.user_id, &refreshed).await {
            tracing::error!(
                "Could not persist refreshed token for user {}: {:?}",
                account.user_id,
                e
            );
        }
        tracing::info!("Refreshed access token for user {}", account.user_id);

        Some(refreshed)
    }
}
