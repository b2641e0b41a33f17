//! Fuzz target for provider-token parsing.
//!
//! Feeds arbitrary strings to the unverified header and claims decoders.
//! Every input must produce `Ok(..)` or `Err(AuthError)`, never a panic.

#![no_main]

use apns_token_auth::{
    jwt::{decode_token_claims, decode_token_header},
    validation::{validate_algorithm, validate_identifier},
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Tokens are always UTF-8
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(header) = decode_token_header(token) {
        let _ = validate_algorithm(&format!("{:?}", header.alg));
        if let Some(ref kid) = header.kid {
            let _ = validate_identifier("kid", kid);
        }
    }

    if let Ok(claims) = decode_token_claims(token) {
        let _ = validate_identifier("iss", &claims.iss);
    }
});
