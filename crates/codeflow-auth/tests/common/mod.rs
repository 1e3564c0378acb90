//! Shared test bridges.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use codeflow_auth::prelude::*;
use codeflow_auth::{
    DefaultCryptoProvider, MemoryStorage, NetworkRequestOptions, NetworkResponse, PkceCodes,
};
use codeflow_auth::error::NetworkError;

pub const CLIENT_ID: &str = "id1";
pub const AUTHORITY: &str = "https://login.example.com/tenant";
pub const REDIRECT_URI: &str = "https://app.example.com/cb";
pub const LOGOUT_URI: &str = "https://app.example.com/logout";
pub const AUTHORIZE_ENDPOINT: &str = "https://login.example.com/tenant/oauth2/v2.0/authorize";
pub const TOKEN_ENDPOINT: &str = "https://login.example.com/tenant/oauth2/v2.0/token";
pub const LOGOUT_ENDPOINT: &str = "https://login.example.com/tenant/oauth2/v2.0/logout";

/// RFC 7636 Appendix B values.
pub const TEST_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const TEST_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn discovery_document() -> serde_json::Value {
    serde_json::json!({
        "issuer": "https://login.example.com/{tenant}/v2.0",
        "authorization_endpoint": "https://login.example.com/{tenant}/oauth2/v2.0/authorize",
        "token_endpoint": "https://login.example.com/{tenant}/oauth2/v2.0/token",
        "end_session_endpoint": "https://login.example.com/{tenant}/oauth2/v2.0/logout",
        "jwks_uri": "https://login.example.com/{tenant}/discovery/v2.0/keys",
        "response_types_supported": ["code"]
    })
}

/// Crypto with predictable GUIDs (`guid-1`, `guid-2`, ...) and fixed PKCE codes.
#[derive(Default)]
pub struct SequentialCrypto {
    counter: AtomicUsize,
}

#[async_trait]
impl CryptoProvider for SequentialCrypto {
    fn create_new_guid(&self) -> String {
        format!("guid-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn base64_encode(&self, input: &str) -> String {
        DefaultCryptoProvider::new().base64_encode(input)
    }

    fn base64_decode(&self, input: &str) -> AuthResult<String> {
        DefaultCryptoProvider::new().base64_decode(input)
    }

    async fn generate_pkce_codes(&self) -> AuthResult<PkceCodes> {
        Ok(PkceCodes {
            verifier: TEST_VERIFIER.to_string(),
            challenge: TEST_CHALLENGE.to_string(),
        })
    }
}

/// A request seen by [`RecordingNetwork`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub options: Option<NetworkRequestOptions>,
}

impl RecordedRequest {
    /// Decoded form body parameters.
    pub fn form(&self) -> Vec<(String, String)> {
        let body = self
            .options
            .as_ref()
            .and_then(|o| o.body.clone())
            .unwrap_or_default();
        url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect()
    }

    pub fn form_value(&self, name: &str) -> Option<String> {
        self.form().into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.options.as_ref().and_then(|o| o.headers.get(name).cloned())
    }
}

/// Network bridge that serves the discovery document and queued POST responses.
pub struct RecordingNetwork {
    discovery: serde_json::Value,
    post_responses: Mutex<VecDeque<Result<NetworkResponse, NetworkError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::with_discovery(discovery_document())
    }

    pub fn with_discovery(discovery: serde_json::Value) -> Self {
        Self {
            discovery,
            post_responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_post(&self, response: Result<NetworkResponse, NetworkError>) {
        self.post_responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect()
    }
}

#[async_trait]
impl NetworkClient for RecordingNetwork {
    async fn send_get_request(
        &self,
        url: &str,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            options,
        });
        Ok(NetworkResponse::new(200, self.discovery.clone()))
    }

    async fn send_post_request(
        &self,
        url: &str,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            options,
        });
        self.post_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NetworkError::transport("no response queued")))
    }
}

/// A module plus handles on its bridges.
pub struct Harness {
    pub module: AuthorizationCodeModule,
    pub storage: MemoryStorage,
    pub network: Arc<RecordingNetwork>,
}

pub fn auth_options() -> AuthOptions {
    AuthOptions::new(CLIENT_ID, AUTHORITY)
        .with_redirect_uri(REDIRECT_URI)
        .with_post_logout_redirect_uri(LOGOUT_URI)
}

pub fn harness_with(
    auth: AuthOptions,
    system: SystemOptions,
    crypto: Arc<dyn CryptoProvider>,
) -> Harness {
    harness_over(
        auth,
        system,
        LoggerOptions::default(),
        crypto,
        RecordingNetwork::new(),
    )
}

pub fn harness_over(
    auth: AuthOptions,
    system: SystemOptions,
    logger: LoggerOptions,
    crypto: Arc<dyn CryptoProvider>,
    network: RecordingNetwork,
) -> Harness {
    init_tracing();
    let config = ClientConfiguration::resolve(auth, system, logger).unwrap();
    let storage = MemoryStorage::new();
    let network = Arc::new(network);
    let module = AuthorizationCodeModule::with_bridges(
        config,
        Arc::new(storage.clone()),
        network.clone(),
        crypto,
    );
    Harness {
        module,
        storage,
        network,
    }
}

/// Harness with sequential GUIDs and fixed PKCE codes.
pub fn harness() -> Harness {
    harness_with(
        auth_options(),
        SystemOptions::default(),
        Arc::new(SequentialCrypto::default()),
    )
}

/// Harness with the default crypto provider.
pub fn random_harness() -> Harness {
    harness_with(
        auth_options(),
        SystemOptions::default(),
        Arc::new(DefaultCryptoProvider::new()),
    )
}

/// Query parameters of a URL, in order.
pub fn query_pairs(url: &str) -> Vec<(String, String)> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

pub fn query_value(url: &str, name: &str) -> Option<String> {
    query_pairs(url)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

/// An unsigned JWT carrying `claims`.
pub fn id_token(claims: serde_json::Value) -> String {
    let crypto = DefaultCryptoProvider::new();
    format!(
        "{}.{}.signature",
        crypto.base64_encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        crypto.base64_encode(&claims.to_string())
    )
}

/// ID token claims issued to [`CLIENT_ID`] by the discovered issuer.
pub fn id_token_claims(nonce: Option<&str>) -> serde_json::Value {
    let mut claims = serde_json::json!({
        "iss": "https://login.example.com/tenant/v2.0",
        "sub": "subject-1",
        "aud": CLIENT_ID,
        "tid": "tenant",
        "oid": "object-1",
        "preferred_username": "user@example.com"
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = serde_json::Value::String(nonce.to_string());
    }
    claims
}

pub fn token_response(nonce: Option<&str>) -> NetworkResponse {
    token_response_with_claims(id_token_claims(nonce))
}

pub fn token_response_with_claims(claims: serde_json::Value) -> NetworkResponse {
    NetworkResponse::new(
        200,
        serde_json::json!({
            "access_token": "access-token-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "ext_expires_in": 7200,
            "refresh_token": "refresh-token-1",
            "scope": "openid profile",
            "id_token": id_token(claims)
        }),
    )
}
