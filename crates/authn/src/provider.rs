//! Token issuing, caching and request authorization.
//!
//! [`TokenAuthProvider`] owns the [`SigningIdentity`] and the current
//! [`IssuedToken`]. The cache is a single value that is swapped atomically on
//! every generation, so concurrent readers see either the previous token or
//! the new one, never a mix.
//!
//! # Architecture
//!
//! ```text
//! generate()  → lock generation mutex
//!             → iat = max(clock.now(), previous iat)
//!             → sign {alg, kid} . {iss, iat}
//!             → swap Arc<IssuedToken> under write lock
//! get()       → clone Arc under read lock
//! authenticate(headers) → apns-topic, authorization: bearer <token>
//! ```
//!
//! There is no background refresh. Callers either call
//! [`generate`](TokenAuthProvider::generate) on their own schedule or call
//! [`refresh_if_stale`](TokenAuthProvider::refresh_if_stale) before sending.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::{Mutex, RwLock};

use crate::{
    clock::{Clock, SystemClock},
    config::{DEFAULT_STALE_AFTER, TokenAuthConfig},
    error::{AuthError, SigningError},
    key::{SigningIdentity, SigningKeyLoader},
    token::{IssuedToken, TokenClaims, sign},
};

/// Header carrying the app bundle ID.
pub const TOPIC_HEADER: &str = "apns-topic";

/// Header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Scheme prefix of the authorization value.
pub const BEARER_PREFIX: &str = "bearer ";

/// Outbound request headers that authorization values can be written to.
pub trait RequestHeaders {
    /// Sets `name` to `value`, replacing any previous value.
    fn insert_header(&mut self, name: &'static str, value: String);
}

impl RequestHeaders for HeaderMap {
    fn insert_header(&mut self, name: &'static str, value: String) {
        let header = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!(header = name, error = %err, "header name rejected, not attached");
                return;
            },
        };

        match HeaderValue::try_from(value) {
            Ok(mut value) => {
                if header == AUTHORIZATION_HEADER {
                    value.set_sensitive(true);
                }
                self.insert(header, value);
            },
            Err(err) => {
                tracing::warn!(header = name, error = %err, "header value rejected, not attached");
            },
        }
    }
}

impl RequestHeaders for HashMap<String, String> {
    fn insert_header(&mut self, name: &'static str, value: String) {
        self.insert(name.to_owned(), value);
    }
}

impl RequestHeaders for BTreeMap<String, String> {
    fn insert_header(&mut self, name: &'static str, value: String) {
        self.insert(name.to_owned(), value);
    }
}

/// Authenticates outbound gateway requests.
pub trait AuthProvider: Send + Sync {
    /// Attaches authentication headers to `headers`.
    fn authenticate(&self, headers: &mut dyn RequestHeaders);
}

/// Issues, caches and attaches ES256 provider tokens.
///
/// The type is `Send + Sync`; share it behind an `Arc`.
#[derive(Debug)]
pub struct TokenAuthProvider {
    identity: SigningIdentity,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    /// Most recently issued token. Replaced whole, never mutated in place.
    current: RwLock<Option<Arc<IssuedToken>>>,
    /// Serializes generation so `iat` stays monotonic and signing never
    /// holds the cache lock.
    generation: Mutex<()>,
}

impl TokenAuthProvider {
    /// Creates a provider using the system clock and default staleness.
    #[must_use]
    pub fn new(identity: SigningIdentity) -> Self {
        Self::with_clock(identity, Arc::new(SystemClock))
    }

    /// Creates a provider with an explicit time source.
    #[must_use]
    pub fn with_clock(identity: SigningIdentity, clock: Arc<dyn Clock>) -> Self {
        Self {
            identity,
            clock,
            stale_after: DEFAULT_STALE_AFTER,
            current: RwLock::new(None),
            generation: Mutex::new(()),
        }
    }

    /// Sets the age after which [`refresh_if_stale`](Self::refresh_if_stale)
    /// regenerates.
    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Validates `config`, loads the key and creates a provider.
    ///
    /// No token is generated; call [`generate`](Self::generate) before the
    /// first request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] for bad identifiers and
    /// [`AuthError::Key`] when the key cannot be loaded.
    pub fn from_config(config: &TokenAuthConfig) -> Result<Self, AuthError> {
        let identity = SigningIdentity::from_config(config)?;
        Ok(Self::new(identity).with_stale_after(config.stale_after()))
    }

    /// Like [`from_config`](Self::from_config) with a custom key loader and
    /// clock.
    ///
    /// # Errors
    ///
    /// See [`from_config`](Self::from_config).
    pub fn from_config_with(
        config: &TokenAuthConfig,
        loader: &dyn SigningKeyLoader,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let identity = SigningIdentity::from_config_with_loader(config, loader)?;
        Ok(Self::with_clock(identity, clock).with_stale_after(config.stale_after()))
    }

    /// The signing identity.
    #[must_use]
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Configured staleness threshold.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Issues a new token, replaces the cached one and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] if the signing step fails. The cached token
    /// is left untouched in that case.
    #[tracing::instrument(skip(self), fields(kid = %self.identity.key().kid()))]
    pub fn generate(&self) -> Result<String, SigningError> {
        let _guard = self.generation.lock();
        self.generate_locked().map(|issued| issued.as_str().to_owned())
    }

    /// Regenerates the token if none exists or the cached one has reached
    /// the staleness threshold, and returns the current token.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] if a regeneration was needed and failed.
    #[tracing::instrument(skip(self), fields(kid = %self.identity.key().kid()))]
    pub fn refresh_if_stale(&self) -> Result<String, SigningError> {
        let _guard = self.generation.lock();

        // Checked under the generation lock so racing callers sign once.
        if let Some(current) = self.current()
            && !current.is_stale(self.clock.now(), self.stale_after)
        {
            return Ok(current.as_str().to_owned());
        }

        self.generate_locked().map(|issued| issued.as_str().to_owned())
    }

    /// The cached token, or `None` if [`generate`](Self::generate) has not
    /// run yet.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.current().map(|issued| issued.as_str().to_owned())
    }

    /// The cached token with its issue time.
    #[must_use]
    pub fn current(&self) -> Option<Arc<IssuedToken>> {
        self.current.read().clone()
    }

    /// Whether no token exists or the cached one has reached the staleness
    /// threshold.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.current().is_none_or(|issued| issued.is_stale(self.clock.now(), self.stale_after))
    }

    fn generate_locked(&self) -> Result<Arc<IssuedToken>, SigningError> {
        let previous_iat = self.current().map(|issued| issued.issued_at().timestamp());
        let now = self.clock.now().timestamp();

        let iat = match previous_iat {
            Some(previous) if previous > now => {
                tracing::warn!(previous, now, "clock moved backwards, reusing previous iat");
                previous
            },
            _ => now,
        };
        let iat = u64::try_from(iat).map_err(|_| {
            SigningError::Serialization(format!("clock is before the epoch ({iat})"))
        })?;

        let claims = TokenClaims { iss: self.identity.team_id().to_owned(), iat };
        let issued = Arc::new(sign(&claims, self.identity.key()).inspect_err(|err| {
            tracing::error!(error = %err, "token signing failed");
        })?);

        *self.current.write() = Some(Arc::clone(&issued));
        tracing::debug!(iat, "issued provider token");

        Ok(issued)
    }
}

impl AuthProvider for TokenAuthProvider {
    fn authenticate(&self, headers: &mut dyn RequestHeaders) {
        headers.insert_header(TOPIC_HEADER, self.identity.app_bundle_id().to_owned());

        match self.current() {
            Some(issued) => {
                let authorization = format!("{BEARER_PREFIX}{}", issued.as_str());
                headers.insert_header(AUTHORIZATION_HEADER, authorization);
            },
            None => {
                tracing::warn!(
                    kid = %self.identity.key().kid(),
                    "no token generated yet, request sent without authorization"
                );
            },
        }
    }
}
