//! Error types for the authorization code client.
//!
//! Failures are grouped the same way callers need to react to them:
//!
//! - [`ClientConfigurationError`] - the client was configured incorrectly
//! - [`ClientAuthError`] - a protocol-level failure inside one attempt
//! - [`InteractionRequiredAuthError`] - the identity provider wants the user back
//! - [`NetworkError`] - transport failures talking to the authority
//!
//! [`AuthError`] wraps all of them for the async entry points.

use std::fmt;

// =============================================================================
// Client Configuration Errors
// =============================================================================

/// Errors caused by malformed or incomplete client configuration.
///
/// These are never retried. Lazily-resolved values (redirect URIs) surface
/// this error at the point of use rather than at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientConfigurationError {
    /// No client id was configured.
    #[error("A client id is required, and none has been set.")]
    EmptyClientId,

    /// No authority was configured.
    #[error("An authority is required, and none has been set.")]
    EmptyAuthority,

    /// The authority string is not a usable URL.
    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),

    /// The authority does not use HTTPS.
    #[error("Authority must use HTTPS: {0}")]
    InsecureAuthority(String),

    /// The redirect URI resolved to nothing.
    #[error("A redirect URI is required for all calls, and none has been set.")]
    RedirectUriEmpty,

    /// The post logout redirect URI resolved to nothing.
    #[error("A post logout redirect has not been set.")]
    PostLogoutRedirectUriEmpty,

    /// A redirect URI is not an absolute URL.
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// The request carried no scopes and no default scopes are configured.
    #[error("Scopes cannot be empty: pass scopes in the request or configure default scopes.")]
    EmptyScopes,

    /// The prompt value is not one of the supported values.
    #[error("Invalid prompt value: {0}. Supported values are login, select_account, consent, none")]
    InvalidPrompt(String),

    /// The claims request is not valid JSON.
    #[error("Invalid claims request: {0}")]
    InvalidClaimsRequest(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl ClientConfigurationError {
    /// Create a `RedirectUriEmpty` error.
    #[must_use]
    pub fn redirect_uri_empty() -> Self {
        Self::RedirectUriEmpty
    }

    /// Create a `PostLogoutRedirectUriEmpty` error.
    #[must_use]
    pub fn post_logout_redirect_uri_empty() -> Self {
        Self::PostLogoutRedirectUriEmpty
    }

    /// Create an `InvalidAuthority` error.
    #[must_use]
    pub fn invalid_authority(message: impl Into<String>) -> Self {
        Self::InvalidAuthority(message.into())
    }

    /// Create an `InvalidRedirectUri` error.
    #[must_use]
    pub fn invalid_redirect_uri(uri: impl Into<String>) -> Self {
        Self::InvalidRedirectUri(uri.into())
    }

    /// Returns `true` if this error is about a redirect target.
    #[must_use]
    pub fn is_redirect_error(&self) -> bool {
        matches!(
            self,
            Self::RedirectUriEmpty | Self::PostLogoutRedirectUriEmpty | Self::InvalidRedirectUri(_)
        )
    }

    /// Stable error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyClientId => "empty_client_id",
            Self::EmptyAuthority => "empty_authority",
            Self::InvalidAuthority(_) => "invalid_authority",
            Self::InsecureAuthority(_) => "insecure_authority",
            Self::RedirectUriEmpty => "redirect_uri_empty",
            Self::PostLogoutRedirectUriEmpty => "post_logout_uri_empty",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::EmptyScopes => "empty_input_scopes_error",
            Self::InvalidPrompt(_) => "invalid_prompt_value",
            Self::InvalidClaimsRequest(_) => "invalid_claims",
            Self::Parse(_) => "config_parse_error",
            Self::InvalidValue(_) => "invalid_config_value",
        }
    }
}

// =============================================================================
// Client Auth Errors
// =============================================================================

/// Protocol-level failures within a single authorization attempt.
///
/// All of these are fatal for the attempt; the caller restarts with a fresh
/// authorization URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientAuthError {
    /// No stored request matches the returned state.
    #[error("State not found: the response state does not match any pending request")]
    StateNotFound,

    /// The stored request carries a different state than the response.
    #[error("State mismatch: the response state does not match the stored request state")]
    StateMismatch,

    /// The stored request is older than the configured request-state TTL.
    #[error("State expired: the pending request is older than the allowed lifetime")]
    StateExpired,

    /// The stored request has no PKCE verifier.
    #[error("PKCE verifier missing from the stored request")]
    MissingPkceVerifier,

    /// The authorization response is missing required fields.
    #[error("Malformed authorization response: {0}")]
    MalformedAuthorizationResponse(String),

    /// The ID token nonce does not match the nonce sent with the request.
    #[error("Nonce mismatch: ID token nonce does not match the request nonce")]
    NonceMismatch,

    /// The ID token could not be decoded.
    #[error("Invalid ID token: {0}")]
    InvalidIdToken(String),

    /// The token endpoint returned a body that is not a token response.
    #[error("Failed to parse token response: {0}")]
    TokenParse(String),

    /// Authority endpoints could not be resolved.
    #[error("Endpoint resolution failed: {0}")]
    EndpointResolution(String),

    /// Discovered metadata belongs to a different authority.
    #[error("Authority mismatch: {0}")]
    AuthorityMismatch(String),

    /// The crypto bridge failed to produce a PKCE pair.
    #[error("PKCE generation failed: {0}")]
    PkceGeneration(String),

    /// A stored request entry could not be decoded.
    #[error("Corrupt request state: {0}")]
    CorruptRequestState(String),
}

impl ClientAuthError {
    /// Create a `MalformedAuthorizationResponse` error.
    #[must_use]
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::MalformedAuthorizationResponse(message.into())
    }

    /// Create an `InvalidIdToken` error.
    #[must_use]
    pub fn invalid_id_token(message: impl Into<String>) -> Self {
        Self::InvalidIdToken(message.into())
    }

    /// Create a `TokenParse` error.
    #[must_use]
    pub fn token_parse(message: impl Into<String>) -> Self {
        Self::TokenParse(message.into())
    }

    /// Create an `EndpointResolution` error.
    #[must_use]
    pub fn endpoint_resolution(message: impl Into<String>) -> Self {
        Self::EndpointResolution(message.into())
    }

    /// Create an `AuthorityMismatch` error.
    #[must_use]
    pub fn authority_mismatch(message: impl Into<String>) -> Self {
        Self::AuthorityMismatch(message.into())
    }

    /// Returns `true` if the error concerns the anti-forgery state.
    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::StateNotFound | Self::StateMismatch | Self::StateExpired
        )
    }

    /// Stable error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::StateNotFound => "state_not_found",
            Self::StateMismatch => "state_mismatch",
            Self::StateExpired => "state_expired",
            Self::MissingPkceVerifier => "pkce_verifier_missing",
            Self::MalformedAuthorizationResponse(_) => "malformed_authorization_response",
            Self::NonceMismatch => "nonce_mismatch",
            Self::InvalidIdToken(_) => "invalid_id_token",
            Self::TokenParse(_) => "token_parsing_error",
            Self::EndpointResolution(_) => "endpoints_resolution_error",
            Self::AuthorityMismatch(_) => "authority_mismatch",
            Self::PkceGeneration(_) => "pkce_generation_error",
            Self::CorruptRequestState(_) => "corrupt_request_state",
        }
    }
}

// =============================================================================
// Interaction Required Errors
// =============================================================================

/// OAuth error codes that mean the user must interact again.
const INTERACTION_REQUIRED_CODES: [&str; 3] =
    ["interaction_required", "consent_required", "login_required"];

/// The identity provider requires interactive re-authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Interaction required: {error} - {description}")]
pub struct InteractionRequiredAuthError {
    /// OAuth error code from the identity provider.
    pub error: String,
    /// Error description from the identity provider.
    pub description: String,
}

impl InteractionRequiredAuthError {
    /// Creates a new interaction-required error.
    #[must_use]
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns `true` if the OAuth error code requests user interaction.
    #[must_use]
    pub fn is_interaction_required_code(code: &str) -> bool {
        INTERACTION_REQUIRED_CODES.contains(&code)
    }
}

// =============================================================================
// Network Errors
// =============================================================================

/// Transport failures talking to the authority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The request never produced a response.
    #[error("Network request failed: {0}")]
    Transport(String),

    /// The server answered with a non-success status and no OAuth error body.
    #[error("HTTP error: status {status}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body could not be read as JSON.
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    /// Create a `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an `HttpStatus` error.
    #[must_use]
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::http_status(status.as_u16(), err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

// =============================================================================
// Umbrella Error
// =============================================================================

/// Any failure produced by the authorization code client.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Client configuration is malformed or incomplete.
    #[error(transparent)]
    Configuration(#[from] ClientConfigurationError),

    /// Protocol failure within one attempt.
    #[error(transparent)]
    Client(#[from] ClientAuthError),

    /// The identity provider requires user interaction.
    #[error(transparent)]
    InteractionRequired(#[from] InteractionRequiredAuthError),

    /// Transport failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The identity provider returned an OAuth error that needs no interaction.
    #[error("Server error: {error} - {description}")]
    Server {
        /// OAuth error code.
        error: String,
        /// Error description.
        description: String,
    },

    /// The storage bridge failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a `Server` error.
    #[must_use]
    pub fn server(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Server {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Creates a `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Maps an OAuth error code from the identity provider to the right variant.
    #[must_use]
    pub fn from_oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        let error = error.into();
        let description = description.into();
        if InteractionRequiredAuthError::is_interaction_required_code(&error) {
            Self::InteractionRequired(InteractionRequiredAuthError::new(error, description))
        } else {
            Self::server(error, description)
        }
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if this is a client auth error.
    #[must_use]
    pub fn is_client_auth_error(&self) -> bool {
        matches!(self, Self::Client(_))
    }

    /// Returns `true` if the caller should show interactive UI.
    #[must_use]
    pub fn is_interaction_required(&self) -> bool {
        matches!(self, Self::InteractionRequired(_))
    }

    /// Returns `true` if the failure came from outside this process.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::InteractionRequired(_)
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Client(_) => ErrorCategory::Protocol,
            Self::InteractionRequired(_) => ErrorCategory::Interaction,
            Self::Network(_) => ErrorCategory::Network,
            Self::Server { .. } => ErrorCategory::Server,
            Self::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Stable error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::Configuration(e) => e.error_code(),
            Self::Client(e) => e.error_code(),
            Self::InteractionRequired(e) => &e.error,
            Self::Network(_) => "network_error",
            Self::Server { error, .. } => error,
            Self::Storage { .. } => "storage_error",
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client configuration errors.
    Configuration,
    /// Protocol errors within one attempt.
    Protocol,
    /// Interactive re-authentication required.
    Interaction,
    /// Transport errors.
    Network,
    /// OAuth errors returned by the identity provider.
    Server,
    /// Storage bridge errors.
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Protocol => write!(f, "protocol"),
            Self::Interaction => write!(f, "interaction"),
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server"),
            Self::Storage => write!(f, "storage"),
        }
    }
}
