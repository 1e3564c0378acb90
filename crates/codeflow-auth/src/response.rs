//! Authorization and token endpoint responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::AuthResult;
use crate::bridge::{CryptoProvider, NetworkResponse};
use crate::error::{AuthError, ClientAuthError, NetworkError};

// =============================================================================
// Authorization Response
// =============================================================================

/// What the identity provider sent back to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeResponse {
    /// Authorization code.
    pub code: String,
    /// State echoed back by the identity provider.
    pub state: String,
    /// Opaque client info, when the provider returns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,
    /// Session state, when the provider returns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
}

impl AuthorizationCodeResponse {
    /// Creates a response from its two required fields.
    #[must_use]
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: state.into(),
            client_info: None,
            session_state: None,
        }
    }

    /// Parses the URL the identity provider redirected to.
    ///
    /// Parameters are read from the fragment when it carries them, else from
    /// the query.
    ///
    /// # Errors
    ///
    /// An `error` parameter becomes `InteractionRequired` or `Server`; a
    /// missing `code` or `state` is `MalformedAuthorizationResponse`.
    pub fn from_redirect_uri(redirect: &str) -> AuthResult<Self> {
        let url = Url::parse(redirect)
            .map_err(|e| ClientAuthError::malformed_response(format!("invalid redirect URL: {}", e)))?;

        let fragment = url.fragment().unwrap_or_default();
        let source = if fragment.contains("code=") || fragment.contains("error=") {
            fragment
        } else {
            url.query().unwrap_or_default()
        };

        let params: HashMap<String, String> = url::form_urlencoded::parse(source.as_bytes())
            .into_owned()
            .collect();
        Self::from_params(&params)
    }

    /// Builds a response from already-decoded parameters.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationCodeResponse::from_redirect_uri`].
    pub fn from_params(params: &HashMap<String, String>) -> AuthResult<Self> {
        if let Some(error) = params.get("error") {
            let description = params.get("error_description").cloned().unwrap_or_default();
            return Err(AuthError::from_oauth_error(error.clone(), description));
        }

        let code = non_empty(params.get("code"))
            .ok_or_else(|| ClientAuthError::malformed_response("missing code"))?;
        let state = non_empty(params.get("state"))
            .ok_or_else(|| ClientAuthError::malformed_response("missing state"))?;

        Ok(Self {
            code,
            state,
            client_info: params.get("client_info").cloned(),
            session_state: params.get("session_state").cloned(),
        })
    }

    /// Checks the required fields are present.
    pub(crate) fn validate(&self) -> Result<(), ClientAuthError> {
        if self.code.trim().is_empty() {
            return Err(ClientAuthError::malformed_response("missing code"));
        }
        if self.state.trim().is_empty() {
            return Err(ClientAuthError::malformed_response("missing state"));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

// =============================================================================
// Token Endpoint Response
// =============================================================================

/// Raw token endpoint payload, success or error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerTokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub ext_expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
    pub client_info: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl ServerTokenResponse {
    /// Interprets a network response from the token endpoint.
    ///
    /// # Errors
    ///
    /// OAuth error bodies map through [`AuthError::from_oauth_error`];
    /// other non-2xx responses are `NetworkError::HttpStatus`; a 2xx body
    /// without an access token is `TokenParse`.
    pub fn from_network_response(response: &NetworkResponse) -> AuthResult<Self> {
        let parsed: Option<Self> = response.json().ok();

        if let Some(error) = parsed.as_ref().and_then(|p| p.error.clone()) {
            let description = parsed
                .as_ref()
                .and_then(|p| p.error_description.clone())
                .unwrap_or_default();
            return Err(AuthError::from_oauth_error(error, description));
        }

        if !response.is_success() {
            return Err(NetworkError::http_status(response.status, response.body.to_string()).into());
        }

        let parsed = parsed.ok_or_else(|| {
            ClientAuthError::token_parse(format!("unexpected token response body: {}", response.body))
        })?;

        if parsed.access_token.as_deref().is_none_or(str::is_empty) {
            return Err(ClientAuthError::token_parse("missing access_token").into());
        }

        Ok(parsed)
    }
}

// =============================================================================
// ID Token Claims
// =============================================================================

/// Claims read from the ID token payload.
///
/// The signature is not verified here; the token came straight from the
/// token endpoint over TLS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    /// Tenant id.
    #[serde(default)]
    pub tid: Option<String>,
    /// Object id of the user in the tenant.
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Claims not listed above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IdTokenClaims {
    /// Decodes the payload segment of a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdToken` if the token is not three segments, or the
    /// payload is not base64-encoded JSON.
    pub fn decode(id_token: &str, crypto: &dyn CryptoProvider) -> AuthResult<Self> {
        let segments: Vec<&str> = id_token.split('.').collect();
        if segments.len() != 3 {
            return Err(ClientAuthError::invalid_id_token(format!(
                "expected 3 segments, got {}",
                segments.len()
            ))
            .into());
        }

        let payload = crypto.base64_decode(segments[1])?;
        serde_json::from_str(&payload)
            .map_err(|e| ClientAuthError::invalid_id_token(format!("payload is not JSON: {}", e)).into())
    }

    /// Checks that the token was issued to `client_id` and, when the
    /// authority publishes one, by `issuer`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdToken` naming the claim that failed.
    pub fn validate(&self, client_id: &str, issuer: Option<&str>) -> Result<(), ClientAuthError> {
        if !self.aud.iter().any(|aud| aud == client_id) {
            return Err(ClientAuthError::invalid_id_token(format!(
                "audience {:?} does not include client id {}",
                self.aud, client_id
            )));
        }

        if let Some(expected) = issuer {
            let matches = self
                .iss
                .as_deref()
                .is_some_and(|iss| iss.trim_end_matches('/') == expected.trim_end_matches('/'));
            if !matches {
                return Err(ClientAuthError::invalid_id_token(format!(
                    "issuer {} does not match {}",
                    self.iss.as_deref().unwrap_or("<none>"),
                    expected
                )));
            }
        }

        Ok(())
    }

    /// Identifier that is unique for the user: `oid`, else `sub`.
    #[must_use]
    pub fn unique_id(&self) -> Option<&str> {
        self.oid.as_deref().or(self.sub.as_deref())
    }
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

// =============================================================================
// Token Result
// =============================================================================

/// Tokens returned to the caller.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResult {
    pub access_token: String,
    pub token_type: String,
    pub id_token: Option<String>,
    pub id_token_claims: Option<IdTokenClaims>,
    pub refresh_token: Option<String>,
    /// Granted scopes; the requested ones when the server does not say.
    pub scopes: Vec<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_on: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ext_expires_on: Option<OffsetDateTime>,
    pub unique_id: Option<String>,
    pub tenant_id: Option<String>,
    /// Application state supplied with the request, if any.
    pub state: Option<String>,
    pub correlation_id: String,
}

impl TokenResult {
    pub(crate) fn from_server_response(
        response: ServerTokenResponse,
        claims: Option<IdTokenClaims>,
        requested_scopes: Vec<String>,
        state: Option<String>,
        correlation_id: String,
        now: OffsetDateTime,
    ) -> Self {
        let scopes = match response.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => requested_scopes,
        };
        let expires_on = response
            .expires_in
            .map(|secs| now + time::Duration::seconds(secs));
        let ext_expires_on = response
            .ext_expires_in
            .map(|secs| now + time::Duration::seconds(secs));

        Self {
            access_token: response.access_token.unwrap_or_default(),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            id_token: response.id_token,
            unique_id: claims.as_ref().and_then(|c| c.unique_id().map(str::to_string)),
            tenant_id: claims.as_ref().and_then(|c| c.tid.clone()),
            id_token_claims: claims,
            refresh_token: response.refresh_token,
            scopes,
            expires_on,
            ext_expires_on,
            state,
            correlation_id,
        }
    }

    /// Returns `true` once the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_on
            .is_some_and(|expires_on| expires_on <= OffsetDateTime::now_utc())
    }
}

impl std::fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("scopes", &self.scopes)
            .field("expires_on", &self.expires_on)
            .field("unique_id", &self.unique_id)
            .field("tenant_id", &self.tenant_id)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
