//! Caller-facing request parameters and query serialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientConfigurationError;

/// The OpenID Connect scope.
pub const OPENID_SCOPE: &str = "openid";

// =============================================================================
// Prompt
// =============================================================================

/// Value of the `prompt` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Force credentials entry.
    Login,
    /// Show the account picker.
    SelectAccount,
    /// Force the consent dialog.
    Consent,
    /// No interaction at all.
    None,
}

impl Prompt {
    /// Parses a prompt value.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigurationError::InvalidPrompt` for unknown values.
    pub fn parse(value: &str) -> Result<Self, ClientConfigurationError> {
        match value {
            "login" => Ok(Self::Login),
            "select_account" => Ok(Self::SelectAccount),
            "consent" => Ok(Self::Consent),
            "none" => Ok(Self::None),
            other => Err(ClientConfigurationError::InvalidPrompt(other.to_string())),
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::SelectAccount => "select_account",
            Self::Consent => "consent",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// An ordered set of scopes.
///
/// Entries are trimmed, empty entries dropped, and duplicates (compared
/// case-insensitively) collapse onto the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet {
    scopes: Vec<String>,
}

impl ScopeSet {
    /// Builds a set from any iterator of scopes.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for scope in scopes {
            set.insert(scope.as_ref());
        }
        set
    }

    /// Parses a space-delimited scope string.
    #[must_use]
    pub fn from_scope_string(scopes: &str) -> Self {
        Self::new(scopes.split_whitespace())
    }

    /// Adds a scope unless it is blank or already present. Returns `true` if added.
    pub fn insert(&mut self, scope: &str) -> bool {
        let scope = scope.trim();
        if scope.is_empty() || self.contains(scope) {
            return false;
        }
        self.scopes.push(scope.to_string());
        true
    }

    /// Case-insensitive membership test.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    /// Space-delimited form used on the wire.
    #[must_use]
    pub fn as_scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.scopes
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        Self::new(scopes)
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(set: ScopeSet) -> Self {
        set.scopes
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// A signed-in account, used as a login hint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Stable account identifier across tenants.
    pub home_account_id: String,
    /// Tenant the account signed in to.
    pub tenant_id: String,
    /// Preferred username, typically an email address.
    pub username: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Parameters of one interactive request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationParameters {
    /// Requested scopes; empty means the configured defaults.
    pub scopes: Vec<String>,
    /// `prompt` parameter.
    pub prompt: Option<Prompt>,
    /// `login_hint` parameter.
    pub login_hint: Option<String>,
    /// `domain_hint` parameter.
    pub domain_hint: Option<String>,
    /// Account whose username is used when no login hint is set.
    pub account: Option<AccountInfo>,
    /// JSON claims request.
    pub claims: Option<String>,
    /// Additional query parameters, appended after the standard ones.
    pub extra_query_parameters: BTreeMap<String, String>,
    /// Correlation id; generated when absent.
    pub correlation_id: Option<String>,
    /// Redirect URI for this request only.
    pub redirect_uri: Option<String>,
    /// Application state round-tripped next to the generated state.
    pub state: Option<String>,
}

impl AuthenticationParameters {
    /// Creates parameters for the given scopes.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    #[must_use]
    pub fn with_login_hint(mut self, login_hint: impl Into<String>) -> Self {
        self.login_hint = Some(login_hint.into());
        self
    }

    #[must_use]
    pub fn with_domain_hint(mut self, domain_hint: impl Into<String>) -> Self {
        self.domain_hint = Some(domain_hint.into());
        self
    }

    #[must_use]
    pub fn with_account(mut self, account: AccountInfo) -> Self {
        self.account = Some(account);
        self
    }

    #[must_use]
    pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    #[must_use]
    pub fn with_extra_query_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra_query_parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Login hint to send: the explicit hint, else the account's username.
    #[must_use]
    pub fn effective_login_hint(&self) -> Option<&str> {
        self.login_hint
            .as_deref()
            .or_else(|| self.account.as_ref().map(|a| a.username.as_str()))
            .filter(|hint| !hint.is_empty())
    }

    /// Checks the claims request, if any, is a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `ClientConfigurationError::InvalidClaimsRequest`.
    pub fn validate_claims(&self) -> Result<(), ClientConfigurationError> {
        let Some(claims) = self.claims.as_deref() else {
            return Ok(());
        };
        match serde_json::from_str::<serde_json::Value>(claims) {
            Ok(serde_json::Value::Object(_)) => Ok(()),
            Ok(_) => Err(ClientConfigurationError::InvalidClaimsRequest(
                "claims must be a JSON object".to_string(),
            )),
            Err(e) => Err(ClientConfigurationError::InvalidClaimsRequest(e.to_string())),
        }
    }
}

/// Parameters of a logout request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoutRequest {
    /// Correlation id; generated when absent.
    pub correlation_id: Option<String>,
    /// Post logout redirect URI for this request only.
    pub post_logout_redirect_uri: Option<String>,
    /// ID token previously issued to the client.
    pub id_token_hint: Option<String>,
}

// =============================================================================
// Query Serialization
// =============================================================================

/// Ordered query-string builder.
///
/// Parameters keep insertion order; names and values are percent-encoded
/// with everything outside the RFC 3986 unreserved set escaped.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.pairs.push((name.to_string(), value.into()));
        self
    }

    pub(crate) fn push_opt(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.push(name, value);
        }
        self
    }

    /// Appends every pair whose name is not already present.
    pub(crate) fn extend_missing(&mut self, extra: &BTreeMap<String, String>) -> &mut Self {
        for (name, value) in extra {
            if !self.pairs.iter().any(|(existing, _)| existing == name) {
                self.push(name, value.as_str());
            }
        }
        self
    }

    pub(crate) fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Appends the query to an endpoint that may already carry one.
    pub(crate) fn append_to(&self, endpoint: &str) -> String {
        let query = self.encode();
        if query.is_empty() {
            return endpoint.to_string();
        }
        let separator = match endpoint.contains('?') {
            true if endpoint.ends_with('?') || endpoint.ends_with('&') => "",
            true => "&",
            false => "?",
        };
        format!("{}{}{}", endpoint, separator, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_set_normalization() {
        let scopes = ScopeSet::new(["openid", " profile ", "", "OpenID", "User.Read", "profile"]);
        assert_eq!(scopes.as_scope_string(), "openid profile User.Read");
        assert_eq!(scopes.len(), 3);
        assert!(scopes.contains("OPENID"));
    }

    #[test]
    fn test_scope_set_from_string_and_serde() {
        let scopes = ScopeSet::from_scope_string("a  b a");
        assert_eq!(scopes.clone().into_vec(), vec!["a", "b"]);

        let json = serde_json::to_string(&scopes).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: ScopeSet = serde_json::from_str(r#"["x","X"," "]"#).unwrap();
        assert_eq!(back.into_vec(), vec!["x"]);
    }

    #[test]
    fn test_prompt_parse() {
        assert_eq!(Prompt::parse("select_account").unwrap(), Prompt::SelectAccount);
        assert_eq!(Prompt::None.to_string(), "none");
        assert!(matches!(
            Prompt::parse("always"),
            Err(ClientConfigurationError::InvalidPrompt(_))
        ));
    }

    #[test]
    fn test_effective_login_hint() {
        let params = AuthenticationParameters::new(["openid"]);
        assert_eq!(params.effective_login_hint(), None);

        let params = params.with_account(AccountInfo {
            username: "user@example.com".to_string(),
            ..AccountInfo::default()
        });
        assert_eq!(params.effective_login_hint(), Some("user@example.com"));

        let params = params.with_login_hint("other@example.com");
        assert_eq!(params.effective_login_hint(), Some("other@example.com"));
    }

    #[test]
    fn test_validate_claims() {
        let params = AuthenticationParameters::default().with_claims(r#"{"id_token":{}}"#);
        assert!(params.validate_claims().is_ok());

        let params = AuthenticationParameters::default().with_claims("[1]");
        assert!(params.validate_claims().is_err());

        let params = AuthenticationParameters::default().with_claims("{not json");
        assert!(matches!(
            params.validate_claims(),
            Err(ClientConfigurationError::InvalidClaimsRequest(_))
        ));
    }

    #[test]
    fn test_query_string_encoding() {
        let mut query = QueryString::new();
        query
            .push("redirect_uri", "https://app.example.com/cb")
            .push("scope", "openid profile")
            .push_opt("prompt", None)
            .push("state", "a~b-c_d.e");
        assert_eq!(
            query.encode(),
            "redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb&scope=openid%20profile&state=a~b-c_d.e"
        );
    }

    #[test]
    fn test_query_string_extend_missing() {
        let mut query = QueryString::new();
        query.push("client_id", "id1");

        let mut extra = BTreeMap::new();
        extra.insert("z".to_string(), "1".to_string());
        extra.insert("client_id".to_string(), "evil".to_string());
        extra.insert("a".to_string(), "2".to_string());
        query.extend_missing(&extra);

        assert_eq!(query.encode(), "client_id=id1&a=2&z=1");
    }

    #[test]
    fn test_append_to_endpoint() {
        let mut query = QueryString::new();
        query.push("a", "1");
        assert_eq!(query.append_to("https://x/authorize"), "https://x/authorize?a=1");
        assert_eq!(query.append_to("https://x/authorize?p=q"), "https://x/authorize?p=q&a=1");
        assert_eq!(QueryString::new().append_to("https://x/"), "https://x/");
    }
}
