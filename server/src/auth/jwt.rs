use std::sync::LazyLock;

use axum::{async_trait, extract::FromRequestParts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

static KEYS: LazyLock<Keys> = LazyLock::new(|| {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    Keys::new(&secret)
});

pub const LONG_TTL: usize = 24 * 60 * 60; // 24 hours

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    /// Hex secrets are decoded, anything else is used as raw bytes
    fn new(secret: &str) -> Self {
        let secret = hex::decode(secret).unwrap_or_else(|_| secret.as_bytes().to_vec());
        Self {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        }
    }
}

/// Session claims issued by the auth provider. `sub` is the profile id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

#[derive(Debug)]
pub(crate) enum AuthError {
    MissingCredentials,
    TokenCreation,
    InvalidToken,
}

#[cfg(debug_assertions)]
pub fn generate_dev_token(user_id: Uuid, email: &str) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user_id,
        email: Some(email.to_string()),
        exp: chrono::Utc::now().timestamp() as usize + LONG_TTL,
    };

    encode_claims(&claims, &KEYS)
}

fn encode_claims(claims: &Claims, keys: &Keys) -> Result<String, AuthError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
        .map_err(|_| AuthError::TokenCreation)
}

fn decode_claims(token: &str, keys: &Keys) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.leeway = 60;

    jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::error!("Error decoding token: {:?}", e);
            AuthError::InvalidToken
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingCredentials)?;

        Ok(decode_claims(bearer.token(), &KEYS)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp_offset: i64) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            email: Some("ann@example.com".to_string()),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        }
    }

    #[test]
    fn test_decode_valid_token() {
        let keys = Keys::new("a1b2c3d4");
        let claims = claims(300);
        let token = encode_claims(&claims, &keys).unwrap();
        let decoded = decode_claims(&token, &keys).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.email.as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn test_reject_expired_token() {
        let keys = Keys::new("a1b2c3d4");
        let token = encode_claims(&claims(-3600), &keys).unwrap();
        assert!(matches!(
            decode_claims(&token, &keys),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_token_signed_with_other_secret() {
        let token = encode_claims(&claims(300), &Keys::new("not hex secret")).unwrap();
        assert!(decode_claims(&token, &Keys::new("a1b2c3d4")).is_err());
    }
}
