//! Provider configuration.
//!
//! [`TokenAuthConfig`] carries the identity parameters and key location for
//! a [`TokenAuthProvider`](crate::TokenAuthProvider). It can be deserialized
//! from any serde format or assembled with the builder.
//!
//! # Example
//!
//! ```
//! use apns_token_auth::TokenAuthConfig;
//!
//! let config = TokenAuthConfig::builder()
//!     .key_id("ABC123DEFG")
//!     .team_id("DEF123GHIJ")
//!     .private_key_path("/etc/push/AuthKey_ABC123DEFG.p8")
//!     .app_bundle_id("com.example.App")
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{error::AuthError, validation::validate_identifier};

/// Default age after which a cached token is regenerated (50 minutes).
///
/// The gateway rejects tokens whose `iat` is more than one hour old; the
/// remaining ten minutes cover clock skew and requests in flight.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(50 * 60);

/// Configuration for token-based gateway authentication.
#[derive(Clone, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct TokenAuthConfig {
    /// Key ID of the signing key (`kid` header).
    #[builder(into)]
    pub(crate) key_id: String,

    /// Developer team ID (`iss` claim).
    #[builder(into)]
    pub(crate) team_id: String,

    /// Path to the EC private key file.
    #[builder(into)]
    pub(crate) private_key_path: PathBuf,

    /// Passphrase for an encrypted key file.
    #[serde(default, skip_serializing)]
    pub(crate) private_key_secret: Option<Zeroizing<String>>,

    /// App bundle ID, sent as the request topic.
    #[builder(into)]
    pub(crate) app_bundle_id: String,

    /// Age after which [`refresh_if_stale`](crate::TokenAuthProvider::refresh_if_stale)
    /// regenerates the token.
    #[serde(with = "humantime_serde", default = "default_stale_after")]
    #[builder(default = DEFAULT_STALE_AFTER)]
    pub(crate) stale_after: Duration,
}

fn default_stale_after() -> Duration {
    DEFAULT_STALE_AFTER
}

impl TokenAuthConfig {
    /// Checks every identifier and the staleness threshold.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<(), AuthError> {
        validate_identifier("key_id", &self.key_id)?;
        validate_identifier("team_id", &self.team_id)?;
        validate_identifier("app_bundle_id", &self.app_bundle_id)?;

        if self.private_key_path.as_os_str().is_empty() {
            return Err(AuthError::invalid_config("private_key_path must not be empty"));
        }

        if self.stale_after.is_zero() {
            return Err(AuthError::invalid_config("stale_after must be greater than zero"));
        }

        Ok(())
    }

    /// Key ID.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Team ID.
    #[must_use]
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// Private key path.
    #[must_use]
    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    /// Key passphrase, if any.
    #[must_use]
    pub fn private_key_secret(&self) -> Option<&str> {
        self.private_key_secret.as_deref().map(String::as_str)
    }

    /// App bundle ID.
    #[must_use]
    pub fn app_bundle_id(&self) -> &str {
        &self.app_bundle_id
    }

    /// Staleness threshold.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

impl fmt::Debug for TokenAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthConfig")
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .field("private_key_path", &self.private_key_path)
            .field("private_key_secret", &self.private_key_secret.as_ref().map(|_| "<redacted>"))
            .field("app_bundle_id", &self.app_bundle_id)
            .field("stale_after", &self.stale_after)
            .finish()
    }
}
