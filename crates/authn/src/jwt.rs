//! Token decoding and verification.
//!
//! The gateway is the real verifier; these helpers exist for diagnostics,
//! for services that want to check a token before sending it, and for tests.
//!
//! # Example
//!
//! ```no_run
//! // Requires a loaded provider.
//! use apns_token_auth::{TokenAuthProvider, jwt::verify_token};
//!
//! # fn example(provider: &TokenAuthProvider) -> Result<(), Box<dyn std::error::Error>> {
//! let token = provider.generate()?;
//! let decoding_key = provider.identity().key().decoding_key()?;
//! let claims = verify_token(&token, &decoding_key)?;
//!
//! println!("Issued by {} at {}", claims.iss, claims.iat);
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};

use crate::{error::AuthError, token::TokenClaims, validation::validate_algorithm};

/// Decode the protected header without verification.
///
/// # Errors
///
/// Returns an error if the header cannot be decoded.
pub fn decode_token_header(token: &str) -> Result<Header, AuthError> {
    decode_header(token).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode token header: {}", e))
    })
}

/// Decode the claims without verification.
///
/// # Errors
///
/// Returns an error if:
/// - The token does not have exactly 3 parts
/// - The payload cannot be base64-decoded
/// - The payload cannot be parsed as JSON claims
/// - The `iss` claim is empty
pub fn decode_token_claims(token: &str) -> Result<TokenClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("Token must have 3 parts separated by dots"));
    }

    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode token payload: {}", e))
    })?;

    let claims: TokenClaims = serde_json::from_slice(&payload_bytes).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to parse token claims: {}", e))
    })?;

    if claims.iss.is_empty() {
        return Err(AuthError::missing_claim("iss"));
    }

    Ok(claims)
}

/// Verify the token signature and return its claims.
///
/// The header must name `ES256` and carry a `kid`. No `exp` claim is
/// required since provider tokens do not carry one.
///
/// # Errors
///
/// Returns an error if:
/// - The header is malformed or lacks `kid`
/// - The algorithm is not `ES256`
/// - The signature does not verify against `key`
#[tracing::instrument(skip_all)]
pub fn verify_token(token: &str, key: &DecodingKey) -> Result<TokenClaims, AuthError> {
    let header = decode_token_header(token)?;

    // Algorithm first, before any key material is used.
    validate_algorithm(&format!("{:?}", header.alg))?;

    if header.kid.as_deref().is_none_or(str::is_empty) {
        return Err(AuthError::missing_claim("kid"));
    }

    let mut validation = Validation::new(Algorithm::ES256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let token_data = decode::<TokenClaims>(token, key, &validation).inspect_err(|e| {
        tracing::debug!(kid = ?header.kid, error = %e, "token verification failed");
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        key::SigningKey,
        testutil::{TEST_KEY_ID, craft_raw_token, generate_test_key},
        token::sign,
    };

    fn signed(iss: &str, iat: u64) -> (String, SigningKey) {
        let key = SigningKey::from_secret_key(TEST_KEY_ID, &generate_test_key()).unwrap();
        let issued = sign(&TokenClaims { iss: iss.into(), iat }, &key).unwrap();
        (issued.as_str().to_owned(), key)
    }

    #[test]
    fn test_decode_header_and_claims() {
        let (token, _) = signed("DEF123GHIJ", 1_700_000_000);

        let header = decode_token_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some(TEST_KEY_ID));
        assert!(header.typ.is_none());

        let claims = decode_token_claims(&token).unwrap();
        assert_eq!(claims, TokenClaims { iss: "DEF123GHIJ".into(), iat: 1_700_000_000 });
    }

    #[test]
    fn test_verify_round_trip() {
        let (token, key) = signed("DEF123GHIJ", 1_700_000_000);
        let claims = verify_token(&token, &key.decoding_key().unwrap()).unwrap();
        assert_eq!(claims.iss, "DEF123GHIJ");
        assert_eq!(claims.iat, 1_700_000_000);
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let (token, _) = signed("DEF123GHIJ", 1_700_000_000);
        let other = SigningKey::from_secret_key(TEST_KEY_ID, &generate_test_key()).unwrap();

        let result = verify_token(&token, &other.decoding_key().unwrap());
        assert!(matches!(result, Err(AuthError::InvalidSignature)), "got: {result:?}");
    }

    #[test]
    fn test_verify_rejects_tampered_claims() {
        let (token, key) = signed("DEF123GHIJ", 1_700_000_000);
        let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
        parts[1] = URL_SAFE_NO_PAD.encode(br#"{"iss":"EVILTEAM00","iat":1700000000}"#);
        let tampered = parts.join(".");

        let result = verify_token(&tampered, &key.decoding_key().unwrap());
        assert!(matches!(result, Err(AuthError::InvalidSignature)), "got: {result:?}");
    }

    #[test]
    fn test_verify_rejects_alg_none() {
        let (_, key) = signed("DEF123GHIJ", 1_700_000_000);
        let token = craft_raw_token(
            &json!({"alg": "none", "kid": TEST_KEY_ID}),
            &json!({"iss": "DEF123GHIJ", "iat": 1_700_000_000}),
        );

        // jsonwebtoken cannot parse "none" as an algorithm at all.
        let result = verify_token(&token, &key.decoding_key().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_rejects_hs256() {
        let (_, key) = signed("DEF123GHIJ", 1_700_000_000);
        let token = craft_raw_token(
            &json!({"alg": "HS256", "kid": TEST_KEY_ID}),
            &json!({"iss": "DEF123GHIJ", "iat": 1_700_000_000}),
        );

        let result = verify_token(&token, &key.decoding_key().unwrap());
        let Err(AuthError::UnsupportedAlgorithm(msg)) = &result else {
            panic!("expected UnsupportedAlgorithm, got: {result:?}");
        };
        assert!(msg.contains("security"), "got: {msg}");
    }

    #[test]
    fn test_verify_requires_kid() {
        let (_, key) = signed("DEF123GHIJ", 1_700_000_000);
        let token = craft_raw_token(
            &json!({"alg": "ES256"}),
            &json!({"iss": "DEF123GHIJ", "iat": 1_700_000_000}),
        );

        let result = verify_token(&token, &key.decoding_key().unwrap());
        assert!(matches!(result, Err(AuthError::MissingClaim(ref c)) if c == "kid"));
    }

    #[test]
    fn test_decode_claims_rejects_empty_issuer() {
        let token = craft_raw_token(
            &json!({"alg": "ES256", "kid": TEST_KEY_ID}),
            &json!({"iss": "", "iat": 1_700_000_000}),
        );
        assert!(matches!(decode_token_claims(&token), Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_decode_claims_rejects_negative_iat() {
        let token = craft_raw_token(
            &json!({"alg": "ES256", "kid": TEST_KEY_ID}),
            &json!({"iss": "DEF123GHIJ", "iat": -1}),
        );
        assert!(matches!(decode_token_claims(&token), Err(AuthError::InvalidTokenFormat(_))));
    }

    /// Known-bad inputs must never panic.
    mod malformed_inputs {
        use super::*;

        fn exercise_parsing(token: &str) -> bool {
            let _ = decode_token_header(token);
            decode_token_claims(token).is_ok()
        }

        #[test]
        fn empty_input_no_panic() {
            assert!(!exercise_parsing(""));
        }

        #[test]
        fn dots_only_no_panic() {
            assert!(!exercise_parsing("."));
            assert!(!exercise_parsing(".."));
            assert!(!exercise_parsing("..."));
        }

        #[test]
        fn plain_string_no_panic() {
            assert!(!exercise_parsing("not-a-token"));
        }

        #[test]
        fn invalid_base64_payload_no_panic() {
            assert!(!exercise_parsing("eyJhbGciOiJFUzI1NiJ9.!!!.sig"));
        }

        #[test]
        fn non_json_payload_no_panic() {
            let payload = URL_SAFE_NO_PAD.encode(b"not json");
            assert!(!exercise_parsing(&format!("eyJhbGciOiJFUzI1NiJ9.{payload}.sig")));
        }

        #[test]
        fn null_bytes_no_panic() {
            assert!(!exercise_parsing("\0.\0.\0"));
        }
    }
}
