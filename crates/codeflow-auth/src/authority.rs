//! Authority URL handling and OpenID Connect metadata discovery.
//!
//! The authority identifies the tenant the client signs in against, e.g.
//! `https://login.example.com/tenant/`. Its endpoints come either from the
//! configuration or from the provider's `.well-known/openid-configuration`
//! document, fetched through the network bridge and cached per [`Authority`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::AuthResult;
use crate::bridge::NetworkClient;
use crate::error::{ClientAuthError, ClientConfigurationError, NetworkError};

/// Placeholders some providers put in multi-tenant metadata.
const TENANT_PLACEHOLDERS: [&str; 2] = ["{tenant}", "{tenantid}"];

/// Path of the discovery document relative to the authority.
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Parses and canonicalizes an authority string.
///
/// The result is HTTPS (unless `allow_http`), has a host, at least one path
/// segment (the tenant), no query or fragment, and ends with `/`.
///
/// # Errors
///
/// Returns `InvalidAuthority` or `InsecureAuthority`.
pub fn canonicalize_authority(
    authority: &str,
    allow_http: bool,
) -> Result<Url, ClientConfigurationError> {
    let mut url = Url::parse(authority.trim())
        .map_err(|e| ClientConfigurationError::invalid_authority(format!("{}: {}", authority, e)))?;

    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => return Err(ClientConfigurationError::InsecureAuthority(authority.to_string())),
        other => {
            return Err(ClientConfigurationError::invalid_authority(format!(
                "unsupported scheme '{}'",
                other
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ClientConfigurationError::invalid_authority(format!(
            "{}: missing host",
            authority
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(ClientConfigurationError::invalid_authority(format!(
            "{}: query and fragment are not allowed",
            authority
        )));
    }

    let path = url.path().trim_matches('/').to_string();
    if path.is_empty() {
        return Err(ClientConfigurationError::invalid_authority(format!(
            "{}: a tenant path segment is required",
            authority
        )));
    }

    url.set_path(&format!("/{}/", path));
    Ok(url)
}

/// Endpoints of an authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMetadata {
    /// Authorization endpoint.
    pub authorization_endpoint: String,

    /// Token endpoint.
    pub token_endpoint: String,

    /// RP-initiated logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl AuthorityMetadata {
    /// Creates metadata from the two required endpoints.
    #[must_use]
    pub fn new(authorization_endpoint: impl Into<String>, token_endpoint: impl Into<String>) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            end_session_endpoint: None,
            issuer: None,
        }
    }

    /// Sets the end session endpoint.
    #[must_use]
    pub fn with_end_session_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.end_session_endpoint = Some(endpoint.into());
        self
    }

    /// Replaces `{tenant}` and checks that every endpoint is an absolute URL.
    fn finalize(mut self, tenant: &str) -> Result<Self, ClientAuthError> {
        self.authorization_endpoint = substitute_tenant(&self.authorization_endpoint, tenant);
        self.token_endpoint = substitute_tenant(&self.token_endpoint, tenant);
        self.end_session_endpoint = self
            .end_session_endpoint
            .map(|endpoint| substitute_tenant(&endpoint, tenant));
        self.issuer = self.issuer.map(|issuer| substitute_tenant(&issuer, tenant));

        check_endpoint("authorization_endpoint", &self.authorization_endpoint)?;
        check_endpoint("token_endpoint", &self.token_endpoint)?;
        if let Some(endpoint) = &self.end_session_endpoint {
            check_endpoint("end_session_endpoint", endpoint)?;
        }

        Ok(self)
    }
}

fn substitute_tenant(value: &str, tenant: &str) -> String {
    TENANT_PLACEHOLDERS
        .iter()
        .fold(value.to_string(), |value, placeholder| value.replace(placeholder, tenant))
}

/// Returns `true` if `issuer` names `authority` or a path below it.
///
/// Scheme, host and port must be equal; a missing trailing slash on the
/// issuer is tolerated.
fn issuer_within_authority(issuer: &str, authority: &Url) -> bool {
    let Ok(issuer) = Url::parse(issuer) else {
        return false;
    };
    let path = format!("{}/", issuer.path().trim_end_matches('/'));

    issuer.scheme() == authority.scheme()
        && issuer.host_str() == authority.host_str()
        && issuer.port_or_known_default() == authority.port_or_known_default()
        && path.starts_with(authority.path())
}

fn check_endpoint(name: &str, value: &str) -> Result<(), ClientAuthError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "https" | "http") => Ok(()),
        Ok(url) => Err(ClientAuthError::endpoint_resolution(format!(
            "{} has unsupported scheme '{}'",
            name,
            url.scheme()
        ))),
        Err(e) => Err(ClientAuthError::endpoint_resolution(format!(
            "{} '{}' is not an absolute URL: {}",
            name, value, e
        ))),
    }
}

struct CachedMetadata {
    metadata: AuthorityMetadata,
    fetched_at: Instant,
}

/// A canonical authority with lazily resolved endpoints.
pub struct Authority {
    url: Url,
    tenant: String,
    configured: Option<AuthorityMetadata>,
    cache_ttl: Duration,
    cache: RwLock<Option<CachedMetadata>>,
}

impl Authority {
    /// Creates an authority from a URL already canonicalized by
    /// [`canonicalize_authority`].
    #[must_use]
    pub fn new(url: Url, configured: Option<AuthorityMetadata>, cache_ttl: Duration) -> Self {
        let tenant = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .unwrap_or_default()
            .to_string();

        Self {
            url,
            tenant,
            configured,
            cache_ttl,
            cache: RwLock::new(None),
        }
    }

    /// Canonical authority URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// First path segment of the authority.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// URL of the discovery document.
    #[must_use]
    pub fn discovery_url(&self) -> String {
        format!("{}{}", self.url, DISCOVERY_PATH)
    }

    /// Returns the authority's endpoints, fetching and caching them if needed.
    ///
    /// # Errors
    ///
    /// Returns a network error if discovery fails, or `EndpointResolution`
    /// if the document lacks usable endpoints.
    pub async fn resolve_endpoints(&self, network: &dyn NetworkClient) -> AuthResult<AuthorityMetadata> {
        if let Some(configured) = &self.configured {
            return Ok(configured.clone().finalize(&self.tenant)?);
        }

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < self.cache_ttl
            {
                tracing::trace!("Cache hit for authority metadata: {}", self.url);
                return Ok(cached.metadata.clone());
            }
        }

        let metadata = self.discover(network).await?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedMetadata {
            metadata: metadata.clone(),
            fetched_at: Instant::now(),
        });

        Ok(metadata)
    }

    /// Drops cached metadata so the next resolution refetches it.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn discover(&self, network: &dyn NetworkClient) -> AuthResult<AuthorityMetadata> {
        let discovery_url = self.discovery_url();
        tracing::debug!("Fetching authority metadata from {}", discovery_url);

        let response = network
            .send_get_request(&discovery_url, None)
            .await
            .inspect_err(|e| {
                tracing::warn!("Failed to fetch authority metadata from {}: {}", discovery_url, e);
            })?;

        if !response.is_success() {
            return Err(NetworkError::http_status(response.status, response.body.to_string()).into());
        }

        let metadata: AuthorityMetadata = response.json().map_err(|e| {
            ClientAuthError::endpoint_resolution(format!(
                "discovery document from {} is invalid: {}",
                discovery_url, e
            ))
        })?;

        let metadata = metadata.finalize(&self.tenant)?;
        self.check_issuer(&metadata)?;
        Ok(metadata)
    }

    /// Rejects discovered metadata whose issuer is not this authority.
    fn check_issuer(&self, metadata: &AuthorityMetadata) -> Result<(), ClientAuthError> {
        let Some(issuer) = metadata.issuer.as_deref() else {
            tracing::warn!("Discovery document for {} has no issuer", self.url);
            return Err(ClientAuthError::authority_mismatch(format!(
                "discovery document for {} has no issuer",
                self.url
            )));
        };

        if !issuer_within_authority(issuer, &self.url) {
            tracing::warn!("Discovered issuer {} does not match authority {}", issuer, self.url);
            return Err(ClientAuthError::authority_mismatch(format!(
                "issuer {} does not match authority {}",
                issuer, self.url
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("url", &self.url.as_str())
            .field("tenant", &self.tenant)
            .field("configured", &self.configured.is_some())
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{NetworkRequestOptions, NetworkResponse};
    use crate::error::AuthError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticNetwork {
        response: NetworkResponse,
        calls: Mutex<Vec<String>>,
    }

    impl StaticNetwork {
        fn new(status: u16, body: serde_json::Value) -> Self {
            Self {
                response: NetworkResponse::new(status, body),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NetworkClient for StaticNetwork {
        async fn send_get_request(
            &self,
            url: &str,
            _options: Option<NetworkRequestOptions>,
        ) -> Result<NetworkResponse, NetworkError> {
            self.calls.lock().unwrap().push(url.to_string());
            Ok(self.response.clone())
        }

        async fn send_post_request(
            &self,
            _url: &str,
            _options: Option<NetworkRequestOptions>,
        ) -> Result<NetworkResponse, NetworkError> {
            Err(NetworkError::transport("unexpected POST"))
        }
    }

    fn discovery_body() -> serde_json::Value {
        serde_json::json!({
            "issuer": "https://login.example.com/{tenant}/v2.0",
            "authorization_endpoint": "https://login.example.com/{tenant}/oauth2/authorize",
            "token_endpoint": "https://login.example.com/{tenant}/oauth2/token",
            "end_session_endpoint": "https://login.example.com/{tenant}/oauth2/logout",
            "jwks_uri": "https://login.example.com/keys"
        })
    }

    fn authority(ttl: Duration) -> Authority {
        let url = canonicalize_authority("https://login.example.com/tenant", false).unwrap();
        Authority::new(url, None, ttl)
    }

    #[test]
    fn test_canonicalize_adds_trailing_slash() {
        let url = canonicalize_authority("https://login.example.com/tenant", false).unwrap();
        assert_eq!(url.as_str(), "https://login.example.com/tenant/");

        let url = canonicalize_authority("https://login.example.com/tenant///", false).unwrap();
        assert_eq!(url.as_str(), "https://login.example.com/tenant/");
    }

    #[test]
    fn test_canonicalize_rejections() {
        assert!(matches!(
            canonicalize_authority("http://login.example.com/tenant", false),
            Err(ClientConfigurationError::InsecureAuthority(_))
        ));
        assert!(canonicalize_authority("http://localhost:8080/tenant", true).is_ok());
        assert!(matches!(
            canonicalize_authority("https://login.example.com", false),
            Err(ClientConfigurationError::InvalidAuthority(_))
        ));
        assert!(canonicalize_authority("https://login.example.com/t?x=1", false).is_err());
        assert!(canonicalize_authority("ftp://login.example.com/t", false).is_err());
        assert!(canonicalize_authority("login.example.com/t", false).is_err());
    }

    #[test]
    fn test_tenant_and_discovery_url() {
        let authority = authority(Duration::from_secs(60));
        assert_eq!(authority.tenant(), "tenant");
        assert_eq!(
            authority.discovery_url(),
            "https://login.example.com/tenant/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_discovery_substitutes_tenant_and_caches() {
        let network = StaticNetwork::new(200, discovery_body());
        let authority = authority(Duration::from_secs(60));

        let metadata = authority.resolve_endpoints(&network).await.unwrap();
        assert_eq!(
            metadata.authorization_endpoint,
            "https://login.example.com/tenant/oauth2/authorize"
        );
        assert_eq!(
            metadata.end_session_endpoint.as_deref(),
            Some("https://login.example.com/tenant/oauth2/logout")
        );

        authority.resolve_endpoints(&network).await.unwrap();
        assert_eq!(network.calls().len(), 1);

        authority.invalidate().await;
        authority.resolve_endpoints(&network).await.unwrap();
        assert_eq!(network.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_refetches() {
        let network = StaticNetwork::new(200, discovery_body());
        let authority = authority(Duration::ZERO);

        authority.resolve_endpoints(&network).await.unwrap();
        authority.resolve_endpoints(&network).await.unwrap();
        assert_eq!(network.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_configured_metadata_skips_discovery() {
        let network = StaticNetwork::new(500, serde_json::Value::Null);
        let url = canonicalize_authority("https://login.example.com/tenant", false).unwrap();
        let authority = Authority::new(
            url,
            Some(AuthorityMetadata::new(
                "https://login.example.com/tenant/authorize",
                "https://login.example.com/tenant/token",
            )),
            Duration::from_secs(60),
        );

        let metadata = authority.resolve_endpoints(&network).await.unwrap();
        assert_eq!(metadata.token_endpoint, "https://login.example.com/tenant/token");
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_http_error() {
        let network = StaticNetwork::new(404, serde_json::json!({"error": "not_found"}));
        let err = authority(Duration::from_secs(60))
            .resolve_endpoints(&network)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Network(NetworkError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_discovery_missing_endpoints() {
        let network = StaticNetwork::new(200, serde_json::json!({"issuer": "x"}));
        let err = authority(Duration::from_secs(60))
            .resolve_endpoints(&network)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Client(ClientAuthError::EndpointResolution(_))
        ));
    }

    #[test]
    fn test_issuer_within_authority() {
        let authority = canonicalize_authority("https://login.example.com/tenant", false).unwrap();
        assert!(issuer_within_authority("https://login.example.com/tenant", &authority));
        assert!(issuer_within_authority("https://login.example.com/tenant/", &authority));
        assert!(issuer_within_authority("https://LOGIN.example.com:443/tenant/v2.0", &authority));
        assert!(!issuer_within_authority("https://evil.example.net/tenant/v2.0", &authority));
        assert!(!issuer_within_authority("https://login.example.com/tenant2", &authority));
        assert!(!issuer_within_authority("https://login.example.com/other/v2.0", &authority));
        assert!(!issuer_within_authority("http://login.example.com/tenant", &authority));
        assert!(!issuer_within_authority("https://login.example.com:8443/tenant", &authority));
        assert!(!issuer_within_authority("not a url", &authority));
    }

    #[test]
    fn test_tenantid_placeholder_is_substituted() {
        assert_eq!(
            substitute_tenant("https://login.example.com/{tenantid}/v2.0", "common"),
            "https://login.example.com/common/v2.0"
        );
    }

    #[tokio::test]
    async fn test_discovery_foreign_issuer_rejected() {
        let network = StaticNetwork::new(
            200,
            serde_json::json!({
                "issuer": "https://evil.example.net/",
                "authorization_endpoint": "https://evil.example.net/authorize",
                "token_endpoint": "https://evil.example.net/token"
            }),
        );
        let authority = authority(Duration::from_secs(60));

        let err = authority.resolve_endpoints(&network).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Client(ClientAuthError::AuthorityMismatch(_))
        ));
        assert_eq!(err.error_code(), "authority_mismatch");

        // Rejected metadata is not cached.
        authority.resolve_endpoints(&network).await.unwrap_err();
        assert_eq!(network.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_without_issuer_rejected() {
        let mut body = discovery_body();
        body.as_object_mut().unwrap().remove("issuer");
        let network = StaticNetwork::new(200, body);

        let err = authority(Duration::from_secs(60))
            .resolve_endpoints(&network)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Client(ClientAuthError::AuthorityMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_discovery_relative_endpoint_rejected() {
        let network = StaticNetwork::new(
            200,
            serde_json::json!({
                "authorization_endpoint": "/authorize",
                "token_endpoint": "https://login.example.com/token"
            }),
        );
        let err = authority(Duration::from_secs(60))
            .resolve_endpoints(&network)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "endpoints_resolution_error");
    }
}
