//! Private signing key loading and the signing identity.
//!
//! A [`SigningKey`] is the in-memory handle for the ES256 private key. It is
//! created once from a key file (typically an `AuthKey_<kid>.p8` file) and
//! never mutated afterwards. Decoding of the file contents is delegated to a
//! [`SigningKeyLoader`], so the rest of the crate does not depend on any
//! particular key-file encoding.
//!
//! # Accepted encodings ([`PemKeyLoader`])
//!
//! | Input | Passphrase |
//! |-------|------------|
//! | PKCS#8 PEM (`PRIVATE KEY`) | ignored |
//! | Encrypted PKCS#8 PEM (`ENCRYPTED PRIVATE KEY`, PBES2) | required |
//! | SEC1 PEM (`EC PRIVATE KEY`) | ignored |
//! | Encrypted SEC1 PEM (`Proc-Type: 4,ENCRYPTED`, `DEK-Info`) | required |
//! | PKCS#8 DER, plain or encrypted | as above |
//!
//! PBES2 keys may use AES-CBC or DES-EDE3-CBC with PBKDF2 (HMAC-SHA1 or
//! SHA-2) or scrypt. Traditional `DEK-Info` keys may use AES-128/192/256-CBC
//! or DES-EDE3-CBC. Anything else (PKCS#12 PBE schemes, other ciphers) fails
//! with [`KeyError::UnsupportedEncryption`].
//!
//! Only keys on NIST P-256 are accepted.

use std::{fmt, path::Path};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey};
use p256::{
    NistP256, PublicKey, SecretKey,
    ecdsa::{self, Signature, signature::Signer},
    elliptic_curve::{ALGORITHM_OID, sec1::ToEncodedPoint},
};
use pkcs8::{
    AssociatedOid, EncryptedPrivateKeyInfo, ObjectIdentifier, PrivateKeyInfo, SecretDocument,
    der,
};
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::{
    config::TokenAuthConfig,
    error::{AuthError, KeyError, SigningError},
    legacy_pem::EncryptedPem,
    validation::{TOKEN_ALGORITHM, validate_identifier},
};

const PKCS8_PEM_LABEL: &str = "PRIVATE KEY";
const ENCRYPTED_PKCS8_PEM_LABEL: &str = "ENCRYPTED PRIVATE KEY";
const SEC1_PEM_LABEL: &str = "EC PRIVATE KEY";

/// Decodes raw key-file bytes into a P-256 private key.
pub trait SigningKeyLoader: Send + Sync {
    /// Decodes `bytes`, decrypting with `passphrase` when the encoding is
    /// encrypted.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] when the bytes are not a P-256 private key or
    /// cannot be decrypted.
    fn load_signing_key(&self, bytes: &[u8], passphrase: Option<&str>)
    -> Result<SecretKey, KeyError>;
}

/// Default [`SigningKeyLoader`] for PEM and PKCS#8 DER inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PemKeyLoader;

impl SigningKeyLoader for PemKeyLoader {
    fn load_signing_key(
        &self,
        bytes: &[u8],
        passphrase: Option<&str>,
    ) -> Result<SecretKey, KeyError> {
        match std::str::from_utf8(bytes) {
            Ok(text) if text.trim_start().starts_with("-----BEGIN") => {
                decode_pem(text.trim(), passphrase)
            },
            _ => decode_der(bytes, passphrase),
        }
    }
}

fn decode_pem(text: &str, passphrase: Option<&str>) -> Result<SecretKey, KeyError> {
    if let Some(encrypted) = EncryptedPem::parse(text)? {
        return decrypt_legacy_pem(&encrypted, passphrase);
    }

    let (label, document) = SecretDocument::from_pem(text)
        .map_err(|e| KeyError::Malformed(format!("invalid PEM: {e}")))?;

    match label {
        PKCS8_PEM_LABEL => {
            if passphrase.is_some() {
                tracing::debug!("passphrase supplied for an unencrypted key, ignoring");
            }
            secret_key_from_pkcs8(document.as_bytes())
        },
        ENCRYPTED_PKCS8_PEM_LABEL => decrypt_pkcs8(document.as_bytes(), passphrase),
        SEC1_PEM_LABEL => secret_key_from_sec1(document.as_bytes()),
        other => Err(KeyError::Malformed(format!("unexpected PEM label '{other}'"))),
    }
}

fn decode_der(bytes: &[u8], passphrase: Option<&str>) -> Result<SecretKey, KeyError> {
    if PrivateKeyInfo::try_from(bytes).is_ok() {
        return secret_key_from_pkcs8(bytes);
    }
    match EncryptedPrivateKeyInfo::try_from(bytes) {
        Ok(_) => decrypt_pkcs8(bytes, passphrase),
        Err(err) if is_unsupported_scheme(&err) => {
            Err(KeyError::UnsupportedEncryption(err.to_string()))
        },
        Err(_) => Err(KeyError::Malformed("not a PEM document or PKCS#8 DER private key".into())),
    }
}

fn decrypt_legacy_pem(
    encrypted: &EncryptedPem,
    passphrase: Option<&str>,
) -> Result<SecretKey, KeyError> {
    if encrypted.label() != SEC1_PEM_LABEL {
        return Err(KeyError::Malformed(format!(
            "unexpected encrypted PEM label '{}'",
            encrypted.label()
        )));
    }
    let passphrase = passphrase.ok_or(KeyError::PassphraseRequired)?;
    let der = encrypted.decrypt(passphrase)?;

    // Valid padding does not prove the passphrase was right.
    secret_key_from_sec1(&der).map_err(|err| match err {
        KeyError::Malformed(msg) => KeyError::Decryption(msg),
        other => other,
    })
}

fn decrypt_pkcs8(der: &[u8], passphrase: Option<&str>) -> Result<SecretKey, KeyError> {
    let encrypted = EncryptedPrivateKeyInfo::try_from(der).map_err(|e| {
        if is_unsupported_scheme(&e) {
            KeyError::UnsupportedEncryption(e.to_string())
        } else {
            KeyError::Malformed(format!("invalid encrypted PKCS#8 document: {e}"))
        }
    })?;
    let passphrase = passphrase.ok_or(KeyError::PassphraseRequired)?;

    let decrypted = encrypted.decrypt(passphrase).map_err(|e| {
        if is_unsupported_scheme(&e) {
            KeyError::UnsupportedEncryption(e.to_string())
        } else {
            KeyError::Decryption(e.to_string())
        }
    })?;

    // A wrong passphrase can still produce valid padding, leaving garbage DER.
    secret_key_from_pkcs8(decrypted.as_bytes()).map_err(|err| match err {
        KeyError::Malformed(msg) => KeyError::Decryption(msg),
        other => other,
    })
}

/// Whether `err` names an encryption or KDF algorithm that is not available.
fn is_unsupported_scheme(err: &pkcs8::Error) -> bool {
    match err {
        pkcs8::Error::Asn1(e) => matches!(
            e.kind(),
            der::ErrorKind::OidUnknown { .. }
                | der::ErrorKind::Value { tag: der::Tag::ObjectIdentifier }
        ),
        pkcs8::Error::EncryptedPrivateKey(pkcs8::pkcs5::Error::UnsupportedAlgorithm { .. }) => {
            true
        },
        _ => false,
    }
}

fn secret_key_from_sec1(der: &[u8]) -> Result<SecretKey, KeyError> {
    SecretKey::from_sec1_der(der)
        .map_err(|e| KeyError::Malformed(format!("invalid SEC1 private key: {e}")))
}

fn secret_key_from_pkcs8(der: &[u8]) -> Result<SecretKey, KeyError> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| KeyError::Malformed(format!("invalid PKCS#8 document: {e}")))?;

    if info.algorithm.oid != ALGORITHM_OID {
        return Err(KeyError::UnsupportedAlgorithm(format!(
            "expected an EC key, found algorithm OID {}",
            info.algorithm.oid
        )));
    }

    let curve = info
        .algorithm
        .parameters_oid()
        .map_err(|e| KeyError::Malformed(format!("missing EC curve parameters: {e}")))?;
    if curve != NistP256::OID {
        return Err(KeyError::UnsupportedCurve(curve_name(curve)));
    }

    SecretKey::try_from(info).map_err(|e| KeyError::Malformed(e.to_string()))
}

fn curve_name(oid: ObjectIdentifier) -> String {
    match oid.to_string().as_str() {
        "1.3.132.0.34" => "secp384r1".to_owned(),
        "1.3.132.0.35" => "secp521r1".to_owned(),
        "1.3.132.0.10" => "secp256k1".to_owned(),
        other => other.to_owned(),
    }
}

/// Declared usage of a key, as in the JWK `use` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUse {
    /// Digital signatures (`"sig"`).
    #[serde(rename = "sig")]
    Signature,
}

/// Public half of a [`SigningKey`] in JWK form (RFC 7517).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    /// Key type, always `"EC"`.
    pub kty: String,
    /// Curve, always `"P-256"`.
    pub crv: String,
    /// Affine x coordinate, base64url without padding.
    pub x: String,
    /// Affine y coordinate, base64url without padding.
    pub y: String,
    /// Key ID.
    pub kid: String,
    /// Algorithm, always `"ES256"`.
    pub alg: String,
    /// Declared usage.
    #[serde(rename = "use")]
    pub key_use: KeyUse,
}

/// Loaded ES256 private key tagged with its key ID.
///
/// The private scalar lives only in the ECDSA signer, which zeroizes it on
/// drop. It is never serialized; the `Debug` output names the key ID alone.
pub struct SigningKey {
    kid: String,
    signer: ecdsa::SigningKey,
    public_key: PublicKey,
    jwk: PublicJwk,
}

impl SigningKey {
    /// Loads the key at `path` with the default [`PemKeyLoader`].
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] when the file is missing or unreadable, is not a
    /// P-256 private key, or cannot be decrypted with `passphrase`.
    pub fn from_file(
        path: &Path,
        passphrase: Option<&str>,
        key_id: &str,
    ) -> Result<Self, KeyError> {
        Self::from_file_with_loader(path, passphrase, key_id, &PemKeyLoader)
    }

    /// Loads the key at `path`, decoding it with `loader`.
    ///
    /// # Errors
    ///
    /// See [`from_file`](Self::from_file).
    #[tracing::instrument(skip_all, fields(path = %path.display(), kid = key_id))]
    pub fn from_file_with_loader(
        path: &Path,
        passphrase: Option<&str>,
        key_id: &str,
        loader: &dyn SigningKeyLoader,
    ) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(std::fs::read(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => KeyError::NotFound { path: path.to_path_buf() },
            _ => KeyError::Unreadable { path: path.to_path_buf(), source },
        })?);

        let secret = loader.load_signing_key(&bytes, passphrase).inspect_err(|err| {
            tracing::warn!(error = %err, "failed to load signing key");
        })?;
        let key = Self::from_secret_key(key_id, &secret)?;

        tracing::info!(kid = %key.kid, alg = TOKEN_ALGORITHM, "loaded signing key");
        Ok(key)
    }

    /// Wraps an already decoded P-256 private key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Rejected`] if the public point cannot be exported.
    pub fn from_secret_key(
        key_id: impl Into<String>,
        secret: &SecretKey,
    ) -> Result<Self, KeyError> {
        let kid = key_id.into();
        let signer = ecdsa::SigningKey::from(secret);

        let public_key = secret.public_key();
        let point = public_key.to_encoded_point(false);
        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            return Err(KeyError::Rejected("public key is the identity point".into()));
        };
        let jwk = PublicJwk {
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
            kid: kid.clone(),
            alg: TOKEN_ALGORITHM.to_owned(),
            key_use: KeyUse::Signature,
        };

        Ok(Self { kid, signer, public_key, jwk })
    }

    /// Key ID placed in the `kid` header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signature algorithm, always [`Algorithm::ES256`].
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::ES256
    }

    /// Declared key usage, always [`KeyUse::Signature`].
    #[must_use]
    pub fn key_use(&self) -> KeyUse {
        KeyUse::Signature
    }

    /// Public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Public key as a JWK.
    #[must_use]
    pub fn public_jwk(&self) -> &PublicJwk {
        &self.jwk
    }

    /// Decoding key for verifying tokens signed by this key.
    ///
    /// # Errors
    ///
    /// Returns an error if the public coordinates are rejected by the
    /// verifier.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        Ok(DecodingKey::from_ec_components(&self.jwk.x, &self.jwk.y)?)
    }

    /// Signs `message` with ES256, returning the fixed-size `r || s`
    /// signature.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Signature, SigningError> {
        Ok(self.signer.try_sign(message)?)
    }
}

impl ZeroizeOnDrop for SigningKey {}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &TOKEN_ALGORITHM)
            .field("use", &self.key_use())
            .finish_non_exhaustive()
    }
}

/// Issuer identity: team ID, app bundle ID and the signing key.
///
/// Immutable after construction.
#[derive(Debug)]
pub struct SigningIdentity {
    team_id: String,
    app_bundle_id: String,
    key: SigningKey,
}

impl SigningIdentity {
    /// Creates an identity from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the team ID, bundle ID or key
    /// ID is not a valid identifier.
    pub fn new(
        team_id: impl Into<String>,
        app_bundle_id: impl Into<String>,
        key: SigningKey,
    ) -> Result<Self, AuthError> {
        let team_id = team_id.into();
        let app_bundle_id = app_bundle_id.into();

        validate_identifier("team_id", &team_id)?;
        validate_identifier("app_bundle_id", &app_bundle_id)?;
        validate_identifier("key_id", key.kid())?;

        Ok(Self { team_id, app_bundle_id, key })
    }

    /// Validates `config` and loads its key with the default loader.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] for bad identifiers and
    /// [`AuthError::Key`] when the key cannot be loaded.
    pub fn from_config(config: &TokenAuthConfig) -> Result<Self, AuthError> {
        Self::from_config_with_loader(config, &PemKeyLoader)
    }

    /// Validates `config` and loads its key with `loader`.
    ///
    /// # Errors
    ///
    /// See [`from_config`](Self::from_config).
    pub fn from_config_with_loader(
        config: &TokenAuthConfig,
        loader: &dyn SigningKeyLoader,
    ) -> Result<Self, AuthError> {
        config.validate()?;

        let key = SigningKey::from_file_with_loader(
            config.private_key_path(),
            config.private_key_secret(),
            config.key_id(),
            loader,
        )?;

        Self::new(config.team_id(), config.app_bundle_id(), key)
    }

    /// Team ID, used as the `iss` claim.
    #[must_use]
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// App bundle ID, used as the request topic.
    #[must_use]
    pub fn app_bundle_id(&self) -> &str {
        &self.app_bundle_id
    }

    /// The signing key.
    #[must_use]
    pub fn key(&self) -> &SigningKey {
        &self.key
    }
}
