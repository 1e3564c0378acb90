//! Authorization code flow with PKCE.
//!
//! An attempt has two entry points correlated through storage:
//!
//! 1. [`AuthorizationCodeModule::create_login_url`] (or
//!    [`AuthorizationCodeModule::create_acquire_token_url`]) draws a PKCE pair,
//!    a state and a nonce, persists them as a [`RequestStateEntry`] keyed by
//!    the state, and returns the authorization URL.
//! 2. [`AuthorizationCodeModule::acquire_token`] looks the entry up by the
//!    returned state, removes it, and redeems the code at the token endpoint.
//!
//! Entries are single use. A missing entry fails the exchange before any
//! network call, and a failed exchange still consumes its entry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::bridge::{CryptoProvider, KeyValueStorage, NetworkClient, NetworkRequestOptions};
use crate::config::ClientConfiguration;
use crate::error::{AuthError, ClientAuthError, ClientConfigurationError};
use crate::logger::Logger;
use crate::pkce::PkceChallengeMethod;
use crate::request::{AuthenticationParameters, LogoutRequest, OPENID_SCOPE, QueryString, ScopeSet};
use crate::response::{AuthorizationCodeResponse, IdTokenClaims, ServerTokenResponse, TokenResult};

use super::{AuthModule, ClientModule, validate_uri};

/// Storage key prefix for pending requests.
const REQUEST_STATE_PREFIX: &str = "codeflow.request";

/// Separates the generated state from application state.
const STATE_DELIMITER: char = '|';

/// Scopes always requested by [`AuthorizationCodeModule::create_login_url`].
const LOGIN_SCOPES: [&str; 2] = [OPENID_SCOPE, "profile"];

/// Material kept across the redirect for one attempt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStateEntry {
    /// Full state value sent to the identity provider.
    pub state: String,
    /// PKCE code verifier.
    pub verifier: String,
    /// Nonce, when the request was an OIDC request.
    pub nonce: Option<String>,
    /// Redirect URI the code was issued for.
    pub redirect_uri: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    pub correlation_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RequestStateEntry {
    /// Returns `true` if the entry is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, ttl: Option<std::time::Duration>, now: OffsetDateTime) -> bool {
        ttl.is_some_and(|ttl| now - self.created_at > ttl)
    }
}

impl std::fmt::Debug for RequestStateEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStateEntry")
            .field("state", &self.state)
            .field("verifier", &"[redacted]")
            .field("nonce", &self.nonce)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("correlation_id", &self.correlation_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Authorization code flow module.
#[derive(Debug)]
pub struct AuthorizationCodeModule {
    base: AuthModule,
}

impl ClientModule for AuthorizationCodeModule {
    fn base(&self) -> &AuthModule {
        &self.base
    }
}

impl AuthorizationCodeModule {
    /// Wraps a base module.
    #[must_use]
    pub fn new(base: AuthModule) -> Self {
        Self { base }
    }

    /// Builds a module over host-provided bridges.
    pub fn with_bridges(
        config: ClientConfiguration,
        storage: Arc<dyn KeyValueStorage>,
        network: Arc<dyn NetworkClient>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self::new(AuthModule::new(config, storage, network, crypto))
    }

    /// Builds a module over the default bridges.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_defaults(config: ClientConfiguration) -> AuthResult<Self> {
        Ok(Self::new(AuthModule::with_defaults(config)?))
    }

    /// Storage key for a state value.
    #[must_use]
    pub fn request_state_key(&self, state: &str) -> String {
        format!("{}{}", self.request_state_prefix(), state)
    }

    /// `codeflow.request.{client_id}.` with the client id percent-encoded,
    /// dots included, so no client's prefix is a prefix of another's.
    fn request_state_prefix(&self) -> String {
        let client_id = urlencoding::encode(self.base.config().client_id()).replace('.', "%2E");
        format!("{}.{}.", REQUEST_STATE_PREFIX, client_id)
    }

    /// Creates a sign-in URL. `openid` and `profile` are always requested.
    ///
    /// # Errors
    ///
    /// Configuration errors for bad scopes, claims or redirect URI; network
    /// or endpoint errors from discovery; storage errors.
    pub async fn create_login_url(&self, request: &AuthenticationParameters) -> AuthResult<String> {
        self.create_url(request, true).await
    }

    /// Creates an authorization URL for the requested scopes.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationCodeModule::create_login_url`].
    pub async fn create_acquire_token_url(
        &self,
        request: &AuthenticationParameters,
    ) -> AuthResult<String> {
        self.create_url(request, false).await
    }

    async fn create_url(&self, request: &AuthenticationParameters, login: bool) -> AuthResult<String> {
        let correlation_id = self.base.correlation_id(request.correlation_id.as_deref());
        let logger = self.base.logger().with_correlation_id(&correlation_id);

        request.validate_claims()?;
        let redirect_uri = self.base.request_redirect_uri(request.redirect_uri.as_deref())?;
        let mut scopes = self.base.normalize_scopes(&request.scopes)?;
        if login {
            for scope in LOGIN_SCOPES {
                scopes.insert(scope);
            }
        }

        let endpoints = self
            .base
            .authority()
            .resolve_endpoints(self.base.network())
            .await?;

        let crypto = self.base.crypto();
        let pkce = crypto.generate_pkce_codes().await?;
        pkce.validate().map_err(|e| {
            logger.error("Crypto provider returned an unusable PKCE pair");
            ClientAuthError::PkceGeneration(e.to_string())
        })?;

        let state = self.encode_state(request.state.as_deref());
        let nonce = scopes
            .contains(OPENID_SCOPE)
            .then(|| crypto.create_new_guid());

        let entry = RequestStateEntry {
            state: state.clone(),
            verifier: pkce.verifier,
            nonce: nonce.clone(),
            redirect_uri: redirect_uri.clone(),
            scopes: scopes.iter().map(str::to_string).collect(),
            correlation_id: correlation_id.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.save_request_state(&entry).await?;

        let mut query = QueryString::new();
        query
            .push("response_type", "code")
            .push("client_id", self.base.config().client_id())
            .push("redirect_uri", redirect_uri.as_str())
            .push("scope", scopes.as_scope_string())
            .push("state", state.as_str())
            .push("code_challenge", pkce.challenge)
            .push("code_challenge_method", PkceChallengeMethod::S256.as_str())
            .push_opt("nonce", nonce.as_deref())
            .push_opt("prompt", request.prompt.map(|p| p.as_str()))
            .push_opt("login_hint", request.effective_login_hint())
            .push_opt("domain_hint", request.domain_hint.as_deref())
            .push_opt("claims", request.claims.as_deref())
            .push("client-request-id", correlation_id.as_str())
            .extend_missing(&request.extra_query_parameters);

        let url = query.append_to(&endpoints.authorization_endpoint);
        logger.info("Authorization URL created");
        logger.verbose_pii(&format!("Authorization URL: {}", url));
        Ok(url)
    }

    /// Redeems an authorization response for tokens.
    ///
    /// # Errors
    ///
    /// - `StateNotFound` when no pending request matches (no network call)
    /// - `StateMismatch`, `StateExpired`, `MissingPkceVerifier`
    /// - server, interaction-required or network errors from the token endpoint
    /// - `InvalidIdToken` when the ID token names another audience or issuer
    /// - `NonceMismatch` when the ID token carries the wrong nonce
    pub async fn acquire_token(&self, response: &AuthorizationCodeResponse) -> AuthResult<TokenResult> {
        response.validate()?;

        let entry = self.take_request_state(&response.state).await?;
        let logger = self.base.logger().with_correlation_id(&entry.correlation_id);

        if entry.state != response.state {
            logger.error("Stored request state does not match the response");
            return Err(ClientAuthError::StateMismatch.into());
        }

        let now = OffsetDateTime::now_utc();
        if entry.is_expired(self.base.config().system().request_state_ttl, now) {
            logger.warning("Pending request expired before the response arrived");
            return Err(ClientAuthError::StateExpired.into());
        }

        if entry.verifier.is_empty() {
            return Err(ClientAuthError::MissingPkceVerifier.into());
        }

        let endpoints = self
            .base
            .authority()
            .resolve_endpoints(self.base.network())
            .await?;

        let scope = ScopeSet::new(&entry.scopes).as_scope_string();
        let mut form = QueryString::new();
        form.push("grant_type", "authorization_code")
            .push("client_id", self.base.config().client_id())
            .push("code", response.code.as_str())
            .push("redirect_uri", entry.redirect_uri.as_str())
            .push("code_verifier", entry.verifier.as_str())
            .push("scope", scope)
            .push_opt("client_secret", self.base.config().client_secret());

        let options = NetworkRequestOptions::new()
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_header("client-request-id", entry.correlation_id.as_str())
            .with_body(form.encode());

        logger.info("Exchanging authorization code");
        let network_response = self
            .base
            .network()
            .send_post_request(&endpoints.token_endpoint, Some(options))
            .await
            .inspect_err(|e| {
                logger.error("Token request failed");
                logger.error_pii(&format!("Token request failed: {}", e));
            })?;

        let server_response = ServerTokenResponse::from_network_response(&network_response)
            .inspect_err(|e| log_token_error(&logger, e))?;

        let claims = match server_response.id_token.as_deref() {
            Some(id_token) => Some(IdTokenClaims::decode(id_token, self.base.crypto())?),
            None => None,
        };
        if let Some(claims) = &claims {
            claims
                .validate(self.base.config().client_id(), endpoints.issuer.as_deref())
                .inspect_err(|e| {
                    logger.error("ID token was not issued for this client by this authority");
                    logger.error_pii(&e.to_string());
                })?;
        }
        check_nonce(entry.nonce.as_deref(), claims.as_ref(), &logger)?;

        let app_state = self.decode_state(&entry.state);
        logger.info("Token acquired");

        Ok(TokenResult::from_server_response(
            server_response,
            claims,
            entry.scopes,
            app_state,
            entry.correlation_id,
            now,
        ))
    }

    /// Parses a redirect URL and redeems it.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationCodeResponse::from_redirect_uri`] and
    /// [`AuthorizationCodeModule::acquire_token`].
    pub async fn acquire_token_from_redirect(&self, redirect: &str) -> AuthResult<TokenResult> {
        let response = AuthorizationCodeResponse::from_redirect_uri(redirect)?;
        self.acquire_token(&response).await
    }

    /// Creates a logout URL and drops this client's pending requests.
    ///
    /// # Errors
    ///
    /// `PostLogoutRedirectUriEmpty` when no post logout redirect is
    /// available, `EndpointResolution` when the authority has no
    /// end session endpoint.
    pub async fn create_logout_url(&self, request: &LogoutRequest) -> AuthResult<String> {
        let post_logout_redirect_uri = match request
            .post_logout_redirect_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
        {
            Some(uri) => {
                validate_uri(uri)?;
                uri.to_string()
            }
            None => self.base.post_logout_redirect_uri()?,
        };

        let correlation_id = self.base.correlation_id(request.correlation_id.as_deref());
        let logger = self.base.logger().with_correlation_id(&correlation_id);

        let endpoints = self
            .base
            .authority()
            .resolve_endpoints(self.base.network())
            .await?;
        let end_session_endpoint = endpoints.end_session_endpoint.ok_or_else(|| {
            ClientAuthError::endpoint_resolution("authority has no end_session_endpoint")
        })?;

        let cleared = self.clear_request_states().await?;
        logger.verbose(&format!("Cleared {} pending request(s) on logout", cleared));

        let mut query = QueryString::new();
        query
            .push("post_logout_redirect_uri", post_logout_redirect_uri)
            .push_opt("id_token_hint", request.id_token_hint.as_deref())
            .push("client-request-id", correlation_id.as_str());

        logger.info("Logout URL created");
        Ok(query.append_to(&end_session_endpoint))
    }

    /// Removes pending requests older than the configured TTL, plus any
    /// entries that can no longer be decoded. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn purge_expired_request_states(&self) -> AuthResult<usize> {
        let Some(ttl) = self.base.config().system().request_state_ttl else {
            return Ok(0);
        };

        let storage = self.base.storage();
        let now = OffsetDateTime::now_utc();
        let mut removed = 0;

        for key in self.request_state_keys().await? {
            let Some(raw) = storage.get_item(&key).await? else {
                continue;
            };
            let stale = match serde_json::from_str::<RequestStateEntry>(&raw) {
                Ok(entry) => entry.is_expired(Some(ttl), now),
                Err(_) => true,
            };
            if stale {
                storage.remove_item(&key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            self.base
                .logger()
                .verbose(&format!("Purged {} expired pending request(s)", removed));
        }
        Ok(removed)
    }

    /// Removes every pending request of this client. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn clear_request_states(&self) -> AuthResult<usize> {
        let keys = self.request_state_keys().await?;
        for key in &keys {
            self.base.storage().remove_item(key).await?;
        }
        Ok(keys.len())
    }

    async fn request_state_keys(&self) -> AuthResult<Vec<String>> {
        let prefix = self.request_state_prefix();
        Ok(self
            .base
            .storage()
            .get_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect())
    }

    async fn save_request_state(&self, entry: &RequestStateEntry) -> AuthResult<()> {
        let value = serde_json::to_string(entry)
            .map_err(|e| ClientAuthError::CorruptRequestState(e.to_string()))?;
        self.base
            .storage()
            .set_item(&self.request_state_key(&entry.state), &value)
            .await
    }

    /// Reads and removes the entry for `state`.
    async fn take_request_state(&self, state: &str) -> AuthResult<RequestStateEntry> {
        let key = self.request_state_key(state);
        let storage = self.base.storage();

        let Some(raw) = storage.get_item(&key).await? else {
            self.base
                .logger()
                .warning("No pending request matches the response state");
            return Err(ClientAuthError::StateNotFound.into());
        };
        storage.remove_item(&key).await?;

        serde_json::from_str(&raw)
            .map_err(|e| ClientAuthError::CorruptRequestState(e.to_string()).into())
    }

    fn encode_state(&self, app_state: Option<&str>) -> String {
        let guid = self.base.crypto().create_new_guid();
        match app_state.filter(|s| !s.is_empty()) {
            Some(app_state) => format!(
                "{}{}{}",
                guid,
                STATE_DELIMITER,
                self.base.crypto().base64_encode(app_state)
            ),
            None => guid,
        }
    }

    fn decode_state(&self, state: &str) -> Option<String> {
        let (_, encoded) = state.split_once(STATE_DELIMITER)?;
        self.base.crypto().base64_decode(encoded).ok()
    }

    /// Reports the effective redirect URI for a request without creating one.
    ///
    /// # Errors
    ///
    /// Same as [`ClientModule::redirect_uri`].
    pub fn effective_redirect_uri(
        &self,
        request: &AuthenticationParameters,
    ) -> Result<String, ClientConfigurationError> {
        self.base.request_redirect_uri(request.redirect_uri.as_deref())
    }
}

/// Logs a token endpoint failure. The provider's description goes to the
/// PII channel only.
fn log_token_error(logger: &Logger, error: &AuthError) {
    logger.error(&format!(
        "Token endpoint returned an error: {} ({})",
        error.error_code(),
        error.category()
    ));
    logger.error_pii(&format!("Token endpoint error detail: {}", error));
}

fn check_nonce(
    expected: Option<&str>,
    claims: Option<&IdTokenClaims>,
    logger: &Logger,
) -> Result<(), ClientAuthError> {
    let (Some(expected), Some(claims)) = (expected, claims) else {
        return Ok(());
    };
    if claims.nonce.as_deref() != Some(expected) {
        logger.error("ID token nonce does not match the request nonce");
        return Err(ClientAuthError::NonceMismatch);
    }
    Ok(())
}
