//! Bridge host and user token.
//!
//! # Design
//! Credentials are an explicit value passed to `BridgeClient::new`, never
//! hidden call-scoped state. They are validated on every request build rather
//! than at construction so an empty field fails the call that needs it, and
//! host-only calls (user creation) still work without a token.

use serde::Deserialize;

use crate::error::{ApiError, CredentialField};

pub const HOST_ENV: &str = "HUE_HOST";
pub const USER_ENV: &str = "HUE_USER";

/// Host URL prefix and bridge-issued user token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    host: String,
    #[serde(default)]
    user: String,
}

impl Credentials {
    pub fn new(host: &str, user: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            user: user.to_string(),
        }
    }

    /// Read `HUE_HOST` and `HUE_USER`. Unset variables become empty fields.
    pub fn from_env() -> Self {
        let host = std::env::var(HOST_ENV).unwrap_or_default();
        let user = std::env::var(USER_ENV).unwrap_or_default();
        Self::new(&host, &user)
    }

    /// Same credentials with a different user token, e.g. after pairing.
    pub fn with_user(&self, user: &str) -> Self {
        Self {
            host: self.host.clone(),
            user: user.to_string(),
        }
    }

    pub fn host(&self) -> Result<&str, ApiError> {
        let host = self.host.trim_end_matches('/');
        if host.trim().is_empty() {
            return Err(ApiError::MissingCredential(CredentialField::Host));
        }
        Ok(host)
    }

    pub fn user(&self) -> Result<&str, ApiError> {
        if self.user.trim().is_empty() {
            return Err(ApiError::MissingCredential(CredentialField::User));
        }
        Ok(&self.user)
    }
}
