use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use derive_more::derive::Display;

static ENCRYPTION_KEY: LazyLock<String> = LazyLock::new(|| {
    std::env::var("TOKEN_ENCRYPTION_KEY").expect("TOKEN_ENCRYPTION_KEY must be set")
});

#[derive(Debug, Display)]
pub enum Error {
    #[display("Encrypt failed: {_0}")]
    EncryptFailed(String),
    #[display("Decrypt failed: {_0}")]
    DecryptFailed(String),
    #[display("Decode failed: {_0}")]
    DecodeFailed(String),
    #[display("String conversion failed: {_0}")]
    StringConversionFailed(String),
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Encrypts `plain` with the process key and returns it base64 encoded
pub fn encrypt(plain: &str) -> Result<String> {
    encrypt_with_key(plain, ENCRYPTION_KEY.as_bytes())
}

pub fn decrypt(encoded: &str) -> Result<String> {
    decrypt_with_key(encoded, ENCRYPTION_KEY.as_bytes())
}

pub fn encrypt_with_key(plain: &str, key: &[u8]) -> Result<String> {
    let bytes = simple_crypt::encrypt(plain.as_bytes(), key)
        .map_err(|e| Error::EncryptFailed(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

pub fn decrypt_with_key(encoded: &str, key: &[u8]) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::DecodeFailed(e.to_string()))?;
    let plain =
        simple_crypt::decrypt(&bytes, key).map_err(|e| Error::DecryptFailed(e.to_string()))?;
    String::from_utf8(plain).map_err(|e| Error::StringConversionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt_with_key() {
        let key = b"test-key";
        let encrypted = encrypt_with_key("ya29.token", key).unwrap();
        assert_ne!(encrypted, "ya29.token");
        assert_eq!(decrypt_with_key(&encrypted, key).unwrap(), "ya29.token");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let encrypted = encrypt_with_key("ya29.token", b"first").unwrap();
        assert!(decrypt_with_key(&encrypted, b"second").is_err());
    }

    #[test]
    fn test_decrypt_rejects_bad_base64() {
        assert!(matches!(
            decrypt_with_key("not base64!!", b"key"),
            Err(Error::DecodeFailed(_))
        ));
    }
}
