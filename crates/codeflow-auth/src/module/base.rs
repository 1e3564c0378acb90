//! State and helpers shared by every flow module.

use std::sync::Arc;

use url::Url;

use crate::AuthResult;
use crate::authority::Authority;
use crate::bridge::{
    CryptoProvider, DefaultCryptoProvider, KeyValueStorage, MemoryStorage, NetworkClient,
    ReqwestNetworkClient,
};
use crate::config::ClientConfiguration;
use crate::error::ClientConfigurationError;
use crate::logger::Logger;
use crate::request::ScopeSet;

/// Configuration, bridges and logger for one client.
///
/// Performs no network or crypto work itself; flow modules compose over it.
pub struct AuthModule {
    config: ClientConfiguration,
    authority: Authority,
    storage: Arc<dyn KeyValueStorage>,
    network: Arc<dyn NetworkClient>,
    crypto: Arc<dyn CryptoProvider>,
    logger: Logger,
}

impl AuthModule {
    /// Creates a module over host-provided bridges.
    pub fn new(
        config: ClientConfiguration,
        storage: Arc<dyn KeyValueStorage>,
        network: Arc<dyn NetworkClient>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Self {
        let authority = Authority::new(
            config.authority_url().clone(),
            config.authority_metadata().cloned(),
            config.system().discovery_cache_ttl,
        );
        let logger = Logger::new(config.logger_options().clone());

        Self {
            config,
            authority,
            storage,
            network,
            crypto,
            logger,
        }
    }

    /// Creates a module with in-memory storage, the `reqwest` network client
    /// and the default crypto provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_defaults(config: ClientConfiguration) -> AuthResult<Self> {
        let network = ReqwestNetworkClient::new(config.system().network_timeout)?;
        Ok(Self::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(network),
            Arc::new(DefaultCryptoProvider::new()),
        ))
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn storage(&self) -> &dyn KeyValueStorage {
        self.storage.as_ref()
    }

    pub fn network(&self) -> &dyn NetworkClient {
        self.network.as_ref()
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Resolves and checks the configured redirect URI.
    ///
    /// # Errors
    ///
    /// `RedirectUriEmpty` when unset or empty, `InvalidRedirectUri` when not
    /// an absolute URL.
    pub fn redirect_uri(&self) -> Result<String, ClientConfigurationError> {
        let uri = self.config.redirect_uri()?;
        validate_uri(&uri)?;
        Ok(uri)
    }

    /// Resolves and checks the configured post logout redirect URI.
    ///
    /// # Errors
    ///
    /// `PostLogoutRedirectUriEmpty` when unset or empty, `InvalidRedirectUri`
    /// when not an absolute URL.
    pub fn post_logout_redirect_uri(&self) -> Result<String, ClientConfigurationError> {
        let uri = self.config.post_logout_redirect_uri()?;
        validate_uri(&uri)?;
        Ok(uri)
    }

    /// Redirect URI for one request: the override if given, else the configured one.
    pub(crate) fn request_redirect_uri(
        &self,
        request_override: Option<&str>,
    ) -> Result<String, ClientConfigurationError> {
        match request_override.map(str::trim).filter(|uri| !uri.is_empty()) {
            Some(uri) => {
                validate_uri(uri)?;
                Ok(uri.to_string())
            }
            None => self.redirect_uri(),
        }
    }

    /// Normalizes requested scopes, falling back to the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns `EmptyScopes` if both are empty.
    pub fn normalize_scopes(&self, requested: &[String]) -> Result<ScopeSet, ClientConfigurationError> {
        let scopes = ScopeSet::new(requested);
        if !scopes.is_empty() {
            return Ok(scopes);
        }

        let defaults = ScopeSet::new(self.config.default_scopes());
        if defaults.is_empty() {
            return Err(ClientConfigurationError::EmptyScopes);
        }
        Ok(defaults)
    }

    /// Uses the caller's correlation id or draws a fresh one.
    pub(crate) fn correlation_id(&self, requested: Option<&str>) -> String {
        requested
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.crypto.create_new_guid())
    }
}

impl std::fmt::Debug for AuthModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthModule")
            .field("config", &self.config)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

/// Checks that a URI is absolute.
///
/// # Errors
///
/// Returns `InvalidRedirectUri`.
pub fn validate_uri(uri: &str) -> Result<(), ClientConfigurationError> {
    match Url::parse(uri) {
        Ok(url) if !url.cannot_be_a_base() => Ok(()),
        Ok(_) => Err(ClientConfigurationError::invalid_redirect_uri(uri)),
        Err(_) => Err(ClientConfigurationError::invalid_redirect_uri(uri)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthOptions, SystemOptions};
    use crate::logger::LoggerOptions;

    const AUTHORITY: &str = "https://login.example.com/tenant";

    fn module(auth: AuthOptions) -> AuthModule {
        let config =
            ClientConfiguration::resolve(auth, SystemOptions::default(), LoggerOptions::default())
                .unwrap();
        AuthModule::with_defaults(config).unwrap()
    }

    #[test]
    fn test_validate_uri() {
        assert!(validate_uri("https://app.example.com/cb").is_ok());
        assert!(validate_uri("myapp://auth").is_ok());
        assert!(validate_uri("/relative").is_err());
        assert!(validate_uri("mailto:user@example.com").is_err());
    }

    #[test]
    fn test_redirect_uri_validation() {
        let module = module(AuthOptions::new("id1", AUTHORITY).with_redirect_uri("not a url"));
        assert!(matches!(
            module.redirect_uri(),
            Err(ClientConfigurationError::InvalidRedirectUri(_))
        ));
    }

    #[test]
    fn test_request_redirect_uri_override() {
        let module = module(
            AuthOptions::new("id1", AUTHORITY).with_redirect_uri("https://app.example.com/cb"),
        );
        assert_eq!(
            module.request_redirect_uri(Some("https://app.example.com/other")).unwrap(),
            "https://app.example.com/other"
        );
        assert_eq!(
            module.request_redirect_uri(Some("  ")).unwrap(),
            "https://app.example.com/cb"
        );
        assert_eq!(module.request_redirect_uri(None).unwrap(), "https://app.example.com/cb");
    }

    #[test]
    fn test_normalize_scopes() {
        let module = module(AuthOptions::new("id1", AUTHORITY));

        let scopes = module
            .normalize_scopes(&["User.Read".to_string(), "user.read".to_string()])
            .unwrap();
        assert_eq!(scopes.as_scope_string(), "User.Read");

        let scopes = module.normalize_scopes(&[]).unwrap();
        assert_eq!(scopes.as_scope_string(), "openid profile");

        let scopes = module.normalize_scopes(&[" ".to_string()]).unwrap();
        assert_eq!(scopes.as_scope_string(), "openid profile");
    }

    #[test]
    fn test_normalize_scopes_blank_defaults() {
        let module = module(AuthOptions::new("id1", AUTHORITY).with_default_scopes([" "]));
        assert_eq!(
            module.normalize_scopes(&[]).unwrap_err(),
            ClientConfigurationError::EmptyScopes
        );
    }

    #[test]
    fn test_correlation_id() {
        let module = module(AuthOptions::new("id1", AUTHORITY));
        assert_eq!(module.correlation_id(Some("given")), "given");
        assert_ne!(module.correlation_id(None), module.correlation_id(None));
    }
}
