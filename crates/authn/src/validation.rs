//! Algorithm and identifier validation.
//!
//! Tokens produced by this crate are always ES256. Verification helpers use
//! [`validate_algorithm`] to refuse anything else before touching a key, and
//! configuration uses [`validate_identifier`] for values that end up in JWT
//! members and request headers.

use crate::error::AuthError;

/// Algorithm identifier placed in every protected header.
pub const TOKEN_ALGORITHM: &str = "ES256";

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, a public key would become the secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted algorithms. Only ES256 (ECDSA over P-256 with SHA-256).
pub const ACCEPTED_ALGORITHMS: &[&str] = &[TOKEN_ALGORITHM];

/// Maximum length of an identifier in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Validate a JWT algorithm against the accepted list.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the algorithm is forbidden
/// or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use apns_token_auth::validation::validate_algorithm;
///
/// assert!(validate_algorithm("ES256").is_ok());
/// assert!(validate_algorithm("EdDSA").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{}' is not allowed for security reasons",
            alg
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{}' is not in accepted list (only ES256 is supported)",
            alg
        )));
    }

    Ok(())
}

/// Validate an identity value (key ID, team ID, bundle ID).
///
/// The value must be non-empty, at most [`MAX_IDENTIFIER_LEN`] bytes, and
/// consist only of visible ASCII characters (no spaces or control
/// characters), since it is copied verbatim into header values.
///
/// # Errors
///
/// Returns [`AuthError::InvalidConfig`] naming `field` when a rule is broken.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), AuthError> {
    if value.is_empty() {
        return Err(AuthError::invalid_config(format!("{field} must not be empty")));
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(AuthError::invalid_config(format!(
            "{field} exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }

    if let Some(c) = value.chars().find(|c| !c.is_ascii_graphic()) {
        return Err(AuthError::invalid_config(format!(
            "{field} contains invalid character {c:?}"
        )));
    }

    Ok(())
}
