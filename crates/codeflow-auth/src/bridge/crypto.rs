//! Crypto bridge.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::AuthResult;
use crate::error::ClientAuthError;
use crate::pkce::PkceCodes;

/// Cryptographic primitives consumed by the client modules.
///
/// GUIDs must be unpredictable: they become the `state` and `nonce` of an
/// attempt and key its storage entry. `generate_pkce_codes` must return a
/// challenge derived from the verifier it returns.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Creates a new random GUID.
    fn create_new_guid(&self) -> String;

    /// Base64url-encodes a string.
    fn base64_encode(&self, input: &str) -> String;

    /// Decodes a base64 or base64url string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or not UTF-8.
    fn base64_decode(&self, input: &str) -> AuthResult<String>;

    /// Generates a fresh PKCE verifier/challenge pair.
    async fn generate_pkce_codes(&self) -> AuthResult<PkceCodes>;
}

/// Default crypto provider backed by `uuid`, `base64`, `sha2` and `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCryptoProvider;

impl DefaultCryptoProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CryptoProvider for DefaultCryptoProvider {
    fn create_new_guid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn base64_encode(&self, input: &str) -> String {
        URL_SAFE_NO_PAD.encode(input.as_bytes())
    }

    fn base64_decode(&self, input: &str) -> AuthResult<String> {
        // Accept both alphabets, with or without padding.
        let normalized: String = input
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();

        let bytes = URL_SAFE_NO_PAD
            .decode(normalized.as_bytes())
            .map_err(|e| ClientAuthError::invalid_id_token(format!("base64 decode failed: {}", e)))?;

        String::from_utf8(bytes).map_err(|e| {
            ClientAuthError::invalid_id_token(format!("decoded value is not UTF-8: {}", e)).into()
        })
    }

    async fn generate_pkce_codes(&self) -> AuthResult<PkceCodes> {
        Ok(PkceCodes::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::PkceChallenge;
    use std::collections::HashSet;

    #[test]
    fn test_guid_uniqueness() {
        let crypto = DefaultCryptoProvider::new();
        let guids: HashSet<String> = (0..256).map(|_| crypto.create_new_guid()).collect();
        assert_eq!(guids.len(), 256);
    }

    #[test]
    fn test_guid_is_uuid() {
        let crypto = DefaultCryptoProvider::new();
        let guid = crypto.create_new_guid();
        assert!(uuid::Uuid::parse_str(&guid).is_ok());
    }

    #[test]
    fn test_base64_encode_decode() {
        let crypto = DefaultCryptoProvider::new();
        let encoded = crypto.base64_encode("{\"sub\":\"user-1\"}");
        assert!(!encoded.contains('='));
        assert_eq!(crypto.base64_decode(&encoded).unwrap(), "{\"sub\":\"user-1\"}");
    }

    #[test]
    fn test_base64_decode_accepts_standard_alphabet() {
        let crypto = DefaultCryptoProvider::new();
        // "??>" encodes to "Pz8+" in standard base64 and "Pz8-" in base64url.
        assert_eq!(crypto.base64_decode("Pz8+").unwrap(), "??>");
        assert_eq!(crypto.base64_decode("Pz8-").unwrap(), "??>");
        assert_eq!(crypto.base64_decode("YQ==").unwrap(), "a");
    }

    #[test]
    fn test_base64_decode_rejects_garbage() {
        let crypto = DefaultCryptoProvider::new();
        assert!(crypto.base64_decode("!!!").is_err());
    }

    #[tokio::test]
    async fn test_generate_pkce_codes() {
        let crypto = DefaultCryptoProvider::new();
        let codes = crypto.generate_pkce_codes().await.unwrap();
        let challenge = PkceChallenge::new(codes.challenge.clone()).unwrap();
        assert!(challenge.matches(&codes.verifier_value().unwrap()));
    }
}
