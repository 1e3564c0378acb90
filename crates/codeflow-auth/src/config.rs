//! Client configuration.
//!
//! Raw options supplied by the host are normalized into an immutable
//! [`ClientConfiguration`]. The client id and authority are checked up front;
//! redirect URIs may be deferred closures and are resolved (and checked) each
//! time they are requested.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! client_id = "6b0e3d4a-client"
//! authority = "https://login.example.com/tenant"
//! redirect_uri = "https://app.example.com/callback"
//! default_scopes = ["openid", "profile"]
//!
//! [system]
//! request_state_ttl = "15m"
//! discovery_cache_ttl = "1h"
//!
//! [logger]
//! level = "warning"
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::authority::{AuthorityMetadata, canonicalize_authority};
use crate::error::ClientConfigurationError;
use crate::logger::LoggerOptions;

/// Scopes requested when a request names none.
pub const DEFAULT_SCOPES: [&str; 2] = ["openid", "profile"];

// =============================================================================
// URI Sources
// =============================================================================

/// A URI given either as a literal or as a closure evaluated on every use.
#[derive(Clone)]
pub enum UriSource {
    /// A fixed URI.
    Literal(String),
    /// A URI computed at the moment it is needed.
    Deferred(Arc<dyn Fn() -> String + Send + Sync>),
}

impl UriSource {
    /// Creates a deferred source.
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(f))
    }

    /// Evaluates the source.
    #[must_use]
    pub fn resolve(&self) -> String {
        match self {
            Self::Literal(uri) => uri.clone(),
            Self::Deferred(f) => f(),
        }
    }
}

impl fmt::Debug for UriSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(uri) => f.debug_tuple("Literal").field(uri).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for UriSource {
    fn from(uri: &str) -> Self {
        Self::Literal(uri.to_string())
    }
}

impl From<String> for UriSource {
    fn from(uri: String) -> Self {
        Self::Literal(uri)
    }
}

impl Serialize for UriSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.resolve())
    }
}

impl<'de> Deserialize<'de> for UriSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Literal)
    }
}

/// Resolves an optional source, rejecting empty results.
fn resolve_required(
    source: Option<&UriSource>,
    empty: ClientConfigurationError,
) -> Result<String, ClientConfigurationError> {
    let uri = source.map(UriSource::resolve).unwrap_or_default();
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(empty);
    }
    Ok(uri.to_string())
}

// =============================================================================
// Raw Options
// =============================================================================

/// Authentication options supplied by the host.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthOptions {
    /// Application (client) id registered with the identity provider.
    pub client_id: String,

    /// Authority URL, e.g. `https://login.example.com/tenant`.
    pub authority: String,

    /// Where the identity provider sends the authorization response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<UriSource>,

    /// Where the identity provider sends the user after logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uri: Option<UriSource>,

    /// Client secret for confidential clients.
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,

    /// Scopes used when a request names none. Empty means [`DEFAULT_SCOPES`].
    pub default_scopes: Vec<String>,

    /// Pre-resolved endpoints; when present, discovery is skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_metadata: Option<AuthorityMetadata>,
}

impl AuthOptions {
    /// Creates options with the two required fields.
    #[must_use]
    pub fn new(client_id: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authority: authority.into(),
            ..Self::default()
        }
    }

    /// Sets a literal or deferred redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<UriSource>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Sets a redirect URI computed on every use.
    #[must_use]
    pub fn with_redirect_uri_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.redirect_uri = Some(UriSource::deferred(f));
        self
    }

    /// Sets a literal or deferred post logout redirect URI.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<UriSource>) -> Self {
        self.post_logout_redirect_uri = Some(uri.into());
        self
    }

    /// Sets a post logout redirect URI computed on every use.
    #[must_use]
    pub fn with_post_logout_redirect_uri_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.post_logout_redirect_uri = Some(UriSource::deferred(f));
        self
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets pre-resolved authority endpoints.
    #[must_use]
    pub fn with_authority_metadata(mut self, metadata: AuthorityMetadata) -> Self {
        self.authority_metadata = Some(metadata);
        self
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("client_id", &self.client_id)
            .field("authority", &self.authority)
            .field("redirect_uri", &self.redirect_uri)
            .field("post_logout_redirect_uri", &self.post_logout_redirect_uri)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field("default_scopes", &self.default_scopes)
            .field("authority_metadata", &self.authority_metadata)
            .finish()
    }
}

/// Runtime behaviour options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemOptions {
    /// Maximum age of a pending request before its state is refused.
    /// `None` leaves expiry entirely to the storage bridge.
    #[serde(with = "humantime_serde")]
    pub request_state_ttl: Option<Duration>,

    /// How long discovered authority metadata is reused.
    #[serde(with = "humantime_serde")]
    pub discovery_cache_ttl: Duration,

    /// Timeout for the default network client.
    #[serde(with = "humantime_serde")]
    pub network_timeout: Duration,

    /// Allow `http://` authorities (testing only).
    pub allow_http_authority: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            request_state_ttl: None,
            discovery_cache_ttl: Duration::from_secs(3600), // 1 hour
            network_timeout: Duration::from_secs(30),
            allow_http_authority: false,
        }
    }
}

impl SystemOptions {
    /// Sets the request-state TTL.
    #[must_use]
    pub fn with_request_state_ttl(mut self, ttl: Duration) -> Self {
        self.request_state_ttl = Some(ttl);
        self
    }

    /// Sets the discovery cache TTL.
    #[must_use]
    pub fn with_discovery_cache_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_cache_ttl = ttl;
        self
    }

    /// Allows `http://` authorities.
    #[must_use]
    pub fn with_allow_http_authority(mut self, allow: bool) -> Self {
        self.allow_http_authority = allow;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigurationError::InvalidValue` for zero durations.
    pub fn validate(&self) -> Result<(), ClientConfigurationError> {
        if self.request_state_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ClientConfigurationError::InvalidValue(
                "request_state_ttl must be > 0".to_string(),
            ));
        }

        if self.network_timeout.is_zero() {
            return Err(ClientConfigurationError::InvalidValue(
                "network_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Shape of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// `[auth]` table.
    pub auth: AuthOptions,
    /// `[system]` table.
    pub system: SystemOptions,
    /// `[logger]` table.
    pub logger: LoggerOptions,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Canonical, immutable client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfiguration {
    auth: AuthOptions,
    authority_url: Url,
    system: SystemOptions,
    logger: LoggerOptions,
}

impl ClientConfiguration {
    /// Normalizes raw options.
    ///
    /// # Errors
    ///
    /// Fails if the client id or authority is missing or the authority is
    /// not a valid URL.
    pub fn resolve(
        mut auth: AuthOptions,
        system: SystemOptions,
        logger: LoggerOptions,
    ) -> Result<Self, ClientConfigurationError> {
        auth.client_id = auth.client_id.trim().to_string();
        if auth.client_id.is_empty() {
            return Err(ClientConfigurationError::EmptyClientId);
        }

        auth.authority = auth.authority.trim().to_string();
        if auth.authority.is_empty() {
            return Err(ClientConfigurationError::EmptyAuthority);
        }

        system.validate()?;
        let authority_url = canonicalize_authority(&auth.authority, system.allow_http_authority)?;

        Ok(Self {
            auth,
            authority_url,
            system,
            logger,
        })
    }

    /// Loads and resolves a TOML configuration document.
    ///
    /// Deferred URIs and logger callbacks cannot come from a file; set them
    /// on the returned [`ConfigFile`] pieces with [`ClientConfiguration::resolve`]
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigurationError::Parse` for malformed TOML, or any
    /// error from [`ClientConfiguration::resolve`].
    pub fn from_toml_str(document: &str) -> Result<Self, ClientConfigurationError> {
        let file: ConfigFile = toml::from_str(document)
            .map_err(|e| ClientConfigurationError::Parse(e.to_string()))?;
        Self::resolve(file.auth, file.system, file.logger)
    }

    /// Client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.auth.client_id
    }

    /// Canonical authority URL (always ends with `/`).
    #[must_use]
    pub fn authority_url(&self) -> &Url {
        &self.authority_url
    }

    /// Client secret, for confidential clients.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.auth.client_secret.as_deref()
    }

    /// Scopes used when a request names none.
    #[must_use]
    pub fn default_scopes(&self) -> Vec<String> {
        if self.auth.default_scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect()
        } else {
            self.auth.default_scopes.clone()
        }
    }

    /// Pre-resolved endpoints, if configured.
    #[must_use]
    pub fn authority_metadata(&self) -> Option<&AuthorityMetadata> {
        self.auth.authority_metadata.as_ref()
    }

    /// System options.
    #[must_use]
    pub fn system(&self) -> &SystemOptions {
        &self.system
    }

    /// Logger options.
    #[must_use]
    pub fn logger_options(&self) -> &LoggerOptions {
        &self.logger
    }

    /// Resolves the redirect URI, evaluating deferred values on every call.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigurationError::RedirectUriEmpty` if nothing is
    /// configured or the resolved value is empty.
    pub fn redirect_uri(&self) -> Result<String, ClientConfigurationError> {
        resolve_required(
            self.auth.redirect_uri.as_ref(),
            ClientConfigurationError::redirect_uri_empty(),
        )
    }

    /// Resolves the post logout redirect URI, evaluating deferred values on every call.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigurationError::PostLogoutRedirectUriEmpty` if
    /// nothing is configured or the resolved value is empty.
    pub fn post_logout_redirect_uri(&self) -> Result<String, ClientConfigurationError> {
        resolve_required(
            self.auth.post_logout_redirect_uri.as_ref(),
            ClientConfigurationError::post_logout_redirect_uri_empty(),
        )
    }
}
