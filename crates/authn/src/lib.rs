//! # APNs Token Authentication
//!
//! Issues and caches the short-lived ES256 provider tokens used to authorize
//! requests to a push-notification gateway.
//!
//! This crate provides:
//! - **Key loading**: P-256 private keys from `.p8`, SEC1 and passphrase-protected files
//! - **Token issuing**: JWS compact tokens with `{alg, kid}` header and `{iss, iat}` claims
//! - **Caching**: one current token per provider, swapped atomically on regeneration
//! - **Request authorization**: `apns-topic` and `authorization: bearer <token>` headers
//!
//! Refresh scheduling is left to the caller. Tokens carry no expiry; the
//! gateway rejects them once `iat` is about an hour old, so call
//! [`TokenAuthProvider::refresh_if_stale`] before sending, or
//! [`TokenAuthProvider::generate`] on a timer.
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use apns_token_auth::{AuthProvider, TokenAuthConfig, TokenAuthProvider};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TokenAuthConfig::builder()
//!     .key_id("ABC123DEFG")
//!     .team_id("DEF123GHIJ")
//!     .private_key_path("/etc/push/AuthKey_ABC123DEFG.p8")
//!     .app_bundle_id("com.example.App")
//!     .build();
//!
//! let provider = TokenAuthProvider::from_config(&config)?;
//! provider.generate()?;
//!
//! let mut headers: HashMap<String, String> = HashMap::new();
//! provider.authenticate(&mut headers);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Time sources.
pub mod clock;
/// Provider configuration.
pub mod config;
/// Error types.
pub mod error;
/// Token decoding and verification.
pub mod jwt;
/// Private key loading and signing identity.
pub mod key;
mod legacy_pem;
/// Token issuing, caching and request authorization.
pub mod provider;
/// Token claims and signing.
pub mod token;
/// Algorithm and identifier validation.
pub mod validation;

/// Test helpers.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_STALE_AFTER, TokenAuthConfig};
pub use error::{AuthError, KeyError, Result, SigningError};
pub use key::{KeyUse, PemKeyLoader, PublicJwk, SigningIdentity, SigningKey, SigningKeyLoader};
pub use provider::{AuthProvider, RequestHeaders, TokenAuthProvider};
pub use token::{IssuedToken, TokenClaims};
