//! Flow modules.
//!
//! [`AuthModule`] holds what every flow needs; flow modules such as
//! [`AuthorizationCodeModule`] compose over it and expose the shared
//! accessors through [`ClientModule`].

pub mod authorization_code;
pub mod base;

pub use authorization_code::{AuthorizationCodeModule, RequestStateEntry};
pub use base::{AuthModule, validate_uri};

use crate::error::ClientConfigurationError;
use crate::logger::Logger;

/// Capabilities shared by every flow module.
pub trait ClientModule {
    /// The shared base.
    fn base(&self) -> &AuthModule;

    /// Resolves the configured redirect URI.
    ///
    /// # Errors
    ///
    /// Fails when the URI is unset, empty or not absolute.
    fn redirect_uri(&self) -> Result<String, ClientConfigurationError> {
        self.base().redirect_uri()
    }

    /// Resolves the configured post logout redirect URI.
    ///
    /// # Errors
    ///
    /// Fails when the URI is unset, empty or not absolute.
    fn post_logout_redirect_uri(&self) -> Result<String, ClientConfigurationError> {
        self.base().post_logout_redirect_uri()
    }

    fn logger(&self) -> &Logger {
        self.base().logger()
    }
}

impl ClientModule for AuthModule {
    fn base(&self) -> &AuthModule {
        self
    }
}

/// The flow a caller has chosen.
#[derive(Debug)]
pub enum FlowModule {
    /// Authorization code with PKCE.
    AuthorizationCode(AuthorizationCodeModule),
}

impl ClientModule for FlowModule {
    fn base(&self) -> &AuthModule {
        match self {
            Self::AuthorizationCode(module) => module.base(),
        }
    }
}

impl From<AuthorizationCodeModule> for FlowModule {
    fn from(module: AuthorizationCodeModule) -> Self {
        Self::AuthorizationCode(module)
    }
}
