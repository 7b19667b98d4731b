use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use derive_more::derive::Display;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

const ISSUER: &str = "Upstash";

#[derive(Debug, Deserialize)]
struct SignatureClaims {
    sub: String,
    body: String,
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum SignatureError {
    #[display("Invalid signature token: {_0}")]
    InvalidToken(String),
    #[display("Signature was issued for {_0}")]
    WrongDestination(String),
    #[display("Body hash does not match signature")]
    BodyMismatch,
}

impl std::error::Error for SignatureError {}

fn body_hash(body: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(body))
}

fn verify_with_key(
    signature: &str,
    body: &[u8],
    destination: &str,
    key: &str,
) -> Result<(), SignatureError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation.validate_nbf = true;
    validation.validate_aud = false;

    let claims = jsonwebtoken::decode::<SignatureClaims>(
        signature,
        &DecodingKey::from_secret(key.as_bytes()),
        &validation,
    )
    .map_err(|e| SignatureError::InvalidToken(e.to_string()))?
    .claims;

    if claims.sub != destination {
        return Err(SignatureError::WrongDestination(claims.sub));
    }

    if claims.body.trim_end_matches('=') != body_hash(body) {
        return Err(SignatureError::BodyMismatch);
    }

    Ok(())
}

/// Checks an `Upstash-Signature` header against the current signing key,
/// then the next one (keys rotate). A token the current key opens but whose
/// claims don't match is rejected without trying the next key.
pub fn verify_signature(
    signature: &str,
    body: &[u8],
    destination: &str,
    current_key: &str,
    next_key: &str,
) -> Result<(), SignatureError> {
    match verify_with_key(signature, body, destination, current_key) {
        Err(SignatureError::InvalidToken(first)) => {
            tracing::debug!("Current signing key rejected signature: {}", first);
            verify_with_key(signature, body, destination, next_key)
        }
        result => result,
    }
}

/// Signing keys and the URL deliveries must be addressed to
#[derive(Clone)]
pub struct QueueAuth {
    pub destination: String,
    pub current_key: String,
    pub next_key: String,
}

impl QueueAuth {
    pub fn verify(&self, signature: &str, body: &[u8]) -> Result<(), SignatureError> {
        verify_signature(
            signature,
            body,
            &self.destination,
            &self.current_key,
            &self.next_key,
        )
    }
}

#[cfg(test)]
pub(crate) fn sign_for_test(key: &str, sub: &str, body: &[u8], exp_offset: i64) -> String {
    use jsonwebtoken::{EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "iss": ISSUER,
        "sub": sub,
        "exp": now + exp_offset,
        "nbf": now - 10,
        "iat": now,
        "jti": "jwt_1",
        "body": base64::engine::general_purpose::URL_SAFE.encode(Sha256::digest(body)),
    });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKER: &str = "https://app.example.com/api/queue/worker";

    fn sign(key: &str, sub: &str, body: &[u8], exp_offset: i64) -> String {
        sign_for_test(key, sub, body, exp_offset)
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"type":"CATEGORIZE_EMAIL"}"#;
        let token = sign("current", WORKER, body, 300);
        assert_eq!(verify_signature(&token, body, WORKER, "current", "next"), Ok(()));
    }

    #[test]
    fn test_next_key_is_accepted() {
        let body = b"{}";
        let token = sign("next", WORKER, body, 300);
        assert_eq!(verify_signature(&token, body, WORKER, "current", "next"), Ok(()));
    }

    #[test]
    fn test_tampered_body() {
        let token = sign("current", WORKER, b"{\"a\":1}", 300);
        assert_eq!(
            verify_signature(&token, b"{\"a\":2}", WORKER, "current", "next"),
            Err(SignatureError::BodyMismatch)
        );
    }

    #[test]
    fn test_wrong_destination() {
        let token = sign("current", "https://evil.example.com/hook", b"{}", 300);
        assert!(matches!(
            verify_signature(&token, b"{}", WORKER, "current", "next"),
            Err(SignatureError::WrongDestination(_))
        ));
    }

    #[test]
    fn test_next_key_claim_errors_are_reported() {
        let token = sign("next", WORKER, b"{\"a\":1}", 300);
        assert_eq!(
            verify_signature(&token, b"{\"a\":2}", WORKER, "current", "next"),
            Err(SignatureError::BodyMismatch)
        );
    }

    #[test]
    fn test_expired_and_unknown_key() {
        let expired = sign("current", WORKER, b"{}", -600);
        assert!(verify_signature(&expired, b"{}", WORKER, "current", "next").is_err());

        let foreign = sign("other", WORKER, b"{}", 300);
        assert!(matches!(
            verify_signature(&foreign, b"{}", WORKER, "current", "next"),
            Err(SignatureError::InvalidToken(_))
        ));
    }
}
