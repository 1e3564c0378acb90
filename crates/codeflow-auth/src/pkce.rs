//! PKCE (Proof Key for Code Exchange) primitives.
//!
//! Implements the client half of RFC 7636 with the S256 method only. The
//! verifier stays with the client until the token exchange; only the
//! challenge is ever placed in an authorization URL.
//!
//! # Example
//!
//! ```
//! use codeflow_auth::pkce::{PkceChallenge, PkceCodes};
//!
//! let codes = PkceCodes::generate();
//! let challenge = PkceChallenge::new(codes.challenge.clone()).unwrap();
//! assert!(challenge.matches(&codes.verifier_value().unwrap()));
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Minimum verifier length from RFC 7636 Section 4.1.
const MIN_VERIFIER_LEN: usize = 43;
/// Maximum verifier length from RFC 7636 Section 4.1.
const MAX_VERIFIER_LEN: usize = 128;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while building PKCE values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside 43-128 characters.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters outside the unreserved set.
    #[error("Invalid verifier characters: must be URL-safe ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Challenge is not valid base64url.
    #[error("Invalid challenge format: must be valid base64url")]
    InvalidChallengeFormat,

    /// Only S256 is supported.
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    /// Challenge is not the S256 transform of the verifier.
    #[error("Challenge does not match the verifier")]
    ChallengeMismatch,
}

// =============================================================================
// Challenge Method
// =============================================================================

/// PKCE challenge method. The `plain` method is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash of the verifier.
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parse a challenge method.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything other than `S256`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// The wire value of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy random string of 43-128 characters drawn from
/// `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Wrap an existing verifier string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length or character set is invalid.
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();
        let len = verifier.len();

        if !(MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generate a random verifier from 32 random bytes (43 base64url characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the verifier and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Challenge
// =============================================================================

/// PKCE code challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Derive the S256 challenge for a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let hash = Sha256::digest(verifier.0.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hash))
    }

    /// Wrap a challenge string produced elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` if it is not base64url.
    pub fn new(challenge: String) -> Result<Self, PkceError> {
        if challenge.is_empty() || URL_SAFE_NO_PAD.decode(&challenge).is_err() {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self(challenge))
    }

    /// Returns `true` if this challenge was derived from `verifier`.
    #[must_use]
    pub fn matches(&self, verifier: &PkceVerifier) -> bool {
        Self::from_verifier(verifier).0 == self.0
    }

    /// The challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceChallenge {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Verifier/Challenge Pair
// =============================================================================

/// A verifier and its challenge, always produced together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceCodes {
    /// The code verifier, kept until the token exchange.
    pub verifier: String,
    /// The code challenge, sent in the authorization URL.
    pub challenge: String,
}

impl PkceCodes {
    /// Generate a fresh S256 pair.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        Self {
            verifier: verifier.into_inner(),
            challenge: challenge.0,
        }
    }

    /// Validate and return the verifier half.
    ///
    /// # Errors
    ///
    /// Returns an error if the verifier is not RFC 7636 compliant.
    pub fn verifier_value(&self) -> Result<PkceVerifier, PkceError> {
        PkceVerifier::new(self.verifier.clone())
    }

    /// Checks that the verifier is well formed and the challenge is derived from it.
    ///
    /// # Errors
    ///
    /// Returns a verifier or challenge format error, or `ChallengeMismatch`.
    pub fn validate(&self) -> Result<(), PkceError> {
        let verifier = self.verifier_value()?;
        let challenge = PkceChallenge::new(self.challenge.clone())?;
        if !challenge.matches(&verifier) {
            return Err(PkceError::ChallengeMismatch);
        }
        Ok(())
    }
}

impl std::fmt::Debug for PkceCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceCodes")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}
