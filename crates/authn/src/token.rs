//! Token claims and compact-serialized token construction.
//!
//! A provider token is a JWS in compact serialization:
//!
//! ```text
//! base64url({"alg":"ES256","kid":"<key_id>"})
//!   . base64url({"iss":"<team_id>","iat":<unix_seconds>})
//!   . base64url(ES256 signature)
//! ```
//!
//! No `exp` claim is set. The gateway judges freshness from `iat`, so
//! staleness is decided by the caller (see [`IssuedToken::is_stale`]).

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use fail::fail_point;
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};

use crate::{error::SigningError, key::SigningKey};

/// Claims carried by a provider token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer, the developer team ID.
    pub iss: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
}

/// A signed token together with the time it was issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    token: String,
    issued_at: DateTime<Utc>,
}

impl IssuedToken {
    /// The compact-serialized token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Issue time (the `iat` claim).
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Age of the token at `now`. Zero if `now` precedes the issue time.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.issued_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the token is at least `max_age` old at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) >= max_age
    }
}

/// Builds the protected header: exactly `alg` and `kid`.
fn protected_header(key: &SigningKey) -> Header {
    let mut header = Header::new(Algorithm::ES256);
    header.typ = None;
    header.kid = Some(key.kid().to_owned());
    header
}

/// Signs `claims` with `key` and returns the issued token.
///
/// # Errors
///
/// Returns [`SigningError`] if serialization or the signing primitive fails.
pub(crate) fn sign(claims: &TokenClaims, key: &SigningKey) -> Result<IssuedToken, SigningError> {
    fail_point!("token-before-sign", |_| {
        Err(SigningError::Signature("injected signing failure".into()))
    });

    let issued_at = i64::try_from(claims.iat)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| SigningError::Serialization(format!("iat {} out of range", claims.iat)))?;

    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected_header(key))?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{payload}");

    let signature = key.sign(signing_input.as_bytes())?;
    let token = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()));

    Ok(IssuedToken { token, issued_at })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testutil::{TEST_KEY_ID, generate_test_key};

    fn test_key() -> SigningKey {
        SigningKey::from_secret_key(TEST_KEY_ID, &generate_test_key()).unwrap()
    }

    fn segment(token: &str, index: usize) -> String {
        let part = token.split('.').nth(index).unwrap();
        String::from_utf8(URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
    }

    #[test]
    fn test_header_is_exactly_alg_and_kid() {
        let key = test_key();
        let claims = TokenClaims { iss: "DEF123GHIJ".into(), iat: 1_700_000_000 };
        let issued = sign(&claims, &key).unwrap();

        let expected = format!(r#"{{"alg":"ES256","kid":"{TEST_KEY_ID}"}}"#);
        assert_eq!(segment(issued.as_str(), 0), expected);
    }

    #[test]
    fn test_claims_are_exactly_iss_and_iat() {
        let key = test_key();
        let claims = TokenClaims { iss: "DEF123GHIJ".into(), iat: 1_700_000_000 };
        let issued = sign(&claims, &key).unwrap();

        assert_eq!(segment(issued.as_str(), 1), r#"{"iss":"DEF123GHIJ","iat":1700000000}"#);
        assert_eq!(issued.issued_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_signature_is_64_bytes() {
        let key = test_key();
        let claims = TokenClaims { iss: "DEF123GHIJ".into(), iat: 1_700_000_000 };
        let issued = sign(&claims, &key).unwrap();

        let signature = issued.as_str().split('.').nth(2).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(signature).unwrap().len(), 64);
    }

    #[test]
    fn test_out_of_range_iat_is_serialization_error() {
        let key = test_key();
        let claims = TokenClaims { iss: "DEF123GHIJ".into(), iat: u64::MAX };
        let result = sign(&claims, &key);
        assert!(matches!(result, Err(SigningError::Serialization(_))), "got: {result:?}");
    }

    #[test]
    fn test_age_and_staleness() {
        let issued_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let token = IssuedToken { token: "a.b.c".into(), issued_at };

        let later = DateTime::from_timestamp(1_700_000_000 + 3_000, 0).unwrap();
        assert_eq!(token.age(later), Duration::from_secs(3_000));
        assert!(token.is_stale(later, Duration::from_secs(3_000)));
        assert!(!token.is_stale(later, Duration::from_secs(3_001)));

        let earlier = DateTime::from_timestamp(1_699_999_000, 0).unwrap();
        assert_eq!(token.age(earlier), Duration::ZERO);
    }
}
