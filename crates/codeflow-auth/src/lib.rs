//! # codeflow-auth
//!
//! OAuth 2.0 / OpenID Connect authorization code flow with PKCE for public
//! and confidential clients.
//!
//! This crate provides:
//! - Deterministic authorization URL construction (PKCE S256, state, nonce)
//! - Single-use request state carried across the redirect in host storage
//! - Code-for-token exchange with OAuth error mapping
//! - OpenID Connect metadata discovery with caching
//! - Pluggable storage, network and crypto bridges
//!
//! ## Overview
//!
//! A sign-in is two calls correlated through storage: build the URL, send
//! the user there, then hand the redirect back to the module to redeem the
//! code. Nothing is held in memory between the two, so the redirect may land
//! in a different process as long as the storage bridge is shared.
//!
//! ```ignore
//! use codeflow_auth::prelude::*;
//!
//! let config = ClientConfiguration::resolve(
//!     AuthOptions::new("id1", "https://login.example.com/tenant")
//!         .with_redirect_uri("https://app.example.com/cb"),
//!     SystemOptions::default(),
//!     LoggerOptions::default(),
//! )?;
//! let module = AuthorizationCodeModule::with_defaults(config)?;
//!
//! let url = module
//!     .create_login_url(&AuthenticationParameters::new(["openid", "profile"]))
//!     .await?;
//! // ... redirect the user, receive the callback ...
//! let tokens = module.acquire_token_from_redirect(&callback_url).await?;
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Client configuration and URI resolution
//! - [`authority`] - Authority validation and metadata discovery
//! - [`bridge`] - Storage, network and crypto capabilities
//! - [`module`] - Flow modules
//! - [`request`] - Request parameters and scope handling
//! - [`response`] - Authorization and token responses
//! - [`pkce`] - PKCE verifier and challenge
//! - [`logger`] - PII-aware logging
//! - [`error`] - Error taxonomy

pub mod authority;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logger;
pub mod module;
pub mod pkce;
pub mod request;
pub mod response;

pub use authority::{Authority, AuthorityMetadata};
pub use bridge::{
    CryptoProvider, DefaultCryptoProvider, KeyValueStorage, MemoryStorage, NetworkClient,
    NetworkRequestOptions, NetworkResponse, ReqwestNetworkClient,
};
pub use config::{AuthOptions, ClientConfiguration, SystemOptions, UriSource};
pub use error::{
    AuthError, ClientAuthError, ClientConfigurationError, ErrorCategory,
    InteractionRequiredAuthError, NetworkError,
};
pub use logger::{LogLevel, Logger, LoggerOptions};
pub use module::{AuthModule, AuthorizationCodeModule, ClientModule, FlowModule, RequestStateEntry};
pub use pkce::PkceCodes;
pub use request::{AccountInfo, AuthenticationParameters, LogoutRequest, Prompt, ScopeSet};
pub use response::{AuthorizationCodeResponse, IdTokenClaims, TokenResult};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use codeflow_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::bridge::{CryptoProvider, KeyValueStorage, NetworkClient};
    pub use crate::config::{AuthOptions, ClientConfiguration, SystemOptions};
    pub use crate::error::{AuthError, ClientAuthError, ClientConfigurationError, ErrorCategory};
    pub use crate::logger::{LogLevel, LoggerOptions};
    pub use crate::module::{AuthorizationCodeModule, ClientModule};
    pub use crate::request::{AuthenticationParameters, LogoutRequest, Prompt};
    pub use crate::response::{AuthorizationCodeResponse, TokenResult};
}
