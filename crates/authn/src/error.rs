//! Error types.
//!
//! Key problems surface once, at construction, as [`KeyError`]. Failures of
//! the signing step surface from `generate` as [`SigningError`]. Everything
//! else in the crate reports through the [`AuthError`] umbrella.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the private signing key.
///
/// These are startup-time configuration failures. A provider is never
/// constructed when key loading fails, so there is no half-initialized state
/// to recover from.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeyError {
    /// The key file does not exist.
    #[error("Key file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The key file exists but could not be read.
    #[error("Key file unreadable: {}", path.display())]
    Unreadable {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key material is not a recognizable private key encoding.
    #[error("Malformed private key: {0}")]
    Malformed(String),

    /// The key is not an elliptic-curve key.
    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key is an EC key on a curve other than P-256.
    #[error("Unsupported curve: {0} (only P-256 is accepted)")]
    UnsupportedCurve(String),

    /// The key is encrypted and no passphrase was supplied.
    #[error("Private key is encrypted but no passphrase was supplied")]
    PassphraseRequired,

    /// The key is encrypted with a cipher this crate cannot decrypt.
    #[error("Unsupported key encryption: {0}")]
    UnsupportedEncryption(String),

    /// Decryption failed, most likely because the passphrase is wrong.
    #[error("Failed to decrypt private key: {0}")]
    Decryption(String),

    /// The key decoded but the signing primitive refused it.
    #[error("Private key rejected by signer: {0}")]
    Rejected(String),
}

/// Errors raised by the signing step of token generation.
///
/// With a validated key these indicate an invariant violation rather than a
/// transient condition and are never retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// Header or claims could not be serialized.
    #[error("Token serialization failed: {0}")]
    Serialization(String),

    /// The signing primitive rejected the key or failed to sign.
    #[error("Token signing failed: {0}")]
    Signature(String),
}

impl From<serde_json::Error> for SigningError {
    fn from(err: serde_json::Error) -> Self {
        SigningError::Serialization(err.to_string())
    }
}

impl From<p256::ecdsa::Error> for SigningError {
    fn from(err: p256::ecdsa::Error) -> Self {
        SigningError::Signature(err.to_string())
    }
}

/// Crate-level error.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Key loading failed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Token signing failed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Configuration is incomplete or contains unusable values.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed token, cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Algorithm not in the accepted list.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Required claim or header member is missing.
    #[error("Missing claim: {0}")]
    MissingClaim(String),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidConfig`].
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        AuthError::InvalidConfig(msg.into())
    }

    /// Creates an [`AuthError::InvalidTokenFormat`].
    pub fn invalid_token_format(msg: impl Into<String>) -> Self {
        AuthError::InvalidTokenFormat(msg.into())
    }

    /// Creates an [`AuthError::InvalidSignature`].
    #[must_use]
    pub fn invalid_signature() -> Self {
        AuthError::InvalidSignature
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        AuthError::UnsupportedAlgorithm(msg.into())
    }

    /// Creates an [`AuthError::MissingClaim`].
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        AuthError::MissingClaim(claim.into())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => {
                AuthError::InvalidTokenFormat("Invalid JWT structure".into())
            },
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm => {
                AuthError::UnsupportedAlgorithm("Algorithm not supported".into())
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
            _ => AuthError::InvalidTokenFormat(format!("JWT error: {}", err)),
        }
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error as _;

    use jsonwebtoken::errors::{Error as JwtError, ErrorKind};

    use super::*;

    #[test]
    fn test_key_error_display() {
        let err = KeyError::NotFound { path: PathBuf::from("/keys/AuthKey.p8") };
        assert_eq!(err.to_string(), "Key file not found: /keys/AuthKey.p8");

        let err = KeyError::PassphraseRequired;
        assert_eq!(err.to_string(), "Private key is encrypted but no passphrase was supplied");

        let err = KeyError::UnsupportedCurve("secp384r1".into());
        assert_eq!(err.to_string(), "Unsupported curve: secp384r1 (only P-256 is accepted)");
    }

    #[test]
    fn test_unreadable_preserves_source_chain() {
        let err = KeyError::Unreadable {
            path: PathBuf::from("/keys/AuthKey.p8"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn test_signing_error_conversions() {
        let err: SigningError = serde_json::from_str::<u64>("\"x\"").unwrap_err().into();
        assert!(matches!(err, SigningError::Serialization(_)));

        let err: SigningError = p256::ecdsa::Error::new().into();
        assert!(matches!(err, SigningError::Signature(_)));
    }

    #[test]
    fn test_auth_error_wraps_key_error_transparently() {
        let err: AuthError = KeyError::PassphraseRequired.into();
        assert!(matches!(err, AuthError::Key(KeyError::PassphraseRequired)));
        assert_eq!(err.to_string(), KeyError::PassphraseRequired.to_string());
    }

    #[test]
    fn test_auth_error_from_jsonwebtoken() {
        let err: AuthError = JwtError::from(ErrorKind::InvalidSignature).into();
        assert!(matches!(err, AuthError::InvalidSignature));

        let err: AuthError = JwtError::from(ErrorKind::InvalidAlgorithm).into();
        assert!(matches!(err, AuthError::UnsupportedAlgorithm(_)));

        let err: AuthError = JwtError::from(ErrorKind::MissingRequiredClaim("iss".into())).into();
        assert!(matches!(err, AuthError::MissingClaim(ref c) if c == "iss"));
    }

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            AuthError::invalid_config("team_id is empty").to_string(),
            "Invalid configuration: team_id is empty"
        );
        assert_eq!(AuthError::missing_claim("kid").to_string(), "Missing claim: kid");
        assert_eq!(AuthError::invalid_signature().to_string(), "Invalid signature");
    }
}
