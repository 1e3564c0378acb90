//! Network bridge.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::NetworkError;

/// Headers and body of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkRequestOptions {
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body, already encoded.
    pub body: Option<String>,
}

impl NetworkRequestOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response with a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers (lowercase names).
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body; `Value::Null` when the body was empty.
    pub body: Value,
}

impl NetworkResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidResponse` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))
    }
}

/// HTTP transport consumed by the client modules.
///
/// Failures surface as `Err`; implementations never swallow them and never
/// retry on their own.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Sends a GET request.
    async fn send_get_request(
        &self,
        url: &str,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError>;

    /// Sends a POST request.
    async fn send_post_request(
        &self,
        url: &str,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError>;
}

/// Network client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestNetworkClient {
    http_client: reqwest::Client,
}

impl ReqwestNetworkClient {
    /// Creates a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError> {
        let mut request = request.header("Accept", "application/json");
        if let Some(options) = options {
            for (name, value) in &options.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = options.body {
                request = request.body(body);
            }
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(_) if !(200..300).contains(&status) => {
                    return Err(NetworkError::http_status(status, text));
                }
                Err(e) => return Err(NetworkError::InvalidResponse(e.to_string())),
            }
        };

        Ok(NetworkResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl NetworkClient for ReqwestNetworkClient {
    async fn send_get_request(
        &self,
        url: &str,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError> {
        tracing::debug!("GET {}", url);
        self.send(self.http_client.get(url), options).await
    }

    async fn send_post_request(
        &self,
        url: &str,
        options: Option<NetworkRequestOptions>,
    ) -> Result<NetworkResponse, NetworkError> {
        tracing::debug!("POST {}", url);
        self.send(self.http_client.post(url), options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_request_options_builder() {
        let options = NetworkRequestOptions::new()
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("a=1");
        assert_eq!(
            options.headers.get("Content-Type").map(String::as_str),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(options.body.as_deref(), Some("a=1"));
    }

    #[test]
    fn test_response_json() {
        #[derive(Deserialize)]
        struct Body {
            value: u32,
        }

        let response = NetworkResponse::new(200, serde_json::json!({"value": 7}));
        assert!(response.is_success());
        assert_eq!(response.json::<Body>().unwrap().value, 7);

        let response = NetworkResponse::new(400, serde_json::json!({"other": true}));
        assert!(!response.is_success());
        assert!(matches!(
            response.json::<Body>(),
            Err(NetworkError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_builds() {
        assert!(ReqwestNetworkClient::new(Duration::from_secs(5)).is_ok());
    }
}
