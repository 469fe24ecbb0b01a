//! Token verification.
//!
//! Verification is a pure, single-pass function of the token, the key
//! material, and the clock. Internally the fine-grained failure taxonomy
//! is preserved; [`TokenVerifier::authorize`] is the boundary that
//! collapses it into an opaque [`Unauthorized`] for remote callers.

use crate::config::Config;
use crate::error::{TokenError, Unauthorized};
use crate::jwks::{Jwk, KeyPublisher};
use crate::jwt::claims::SessionClaims;
use crate::jwt::token::{Token, TokenMode, Unverified};
use crate::keys::KeyStore;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Validates tokens against the shared key material and deployment
/// constants.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    store: Arc<KeyStore>,
    publisher: KeyPublisher,
    config: Arc<Config>,
}

impl TokenVerifier {
    /// Create a verifier over the given store and configuration.
    #[must_use]
    pub fn new(store: Arc<KeyStore>, config: Arc<Config>) -> Self {
        let publisher = KeyPublisher::new(Arc::clone(&store));
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Verify a token against the wall clock.
    ///
    /// # Errors
    ///
    /// See [`TokenError`]; every variant returned here is recoverable.
    #[instrument(skip(self, raw), fields(mode = %mode.as_str()))]
    pub fn verify(&self, raw: &str, mode: TokenMode) -> Result<SessionClaims, TokenError> {
        self.verify_at(raw, mode, chrono::Utc::now().timestamp())
    }

    /// Verify with an explicit clock. Claim checks use `now`; everything
    /// else is independent of time.
    pub fn verify_at(
        &self,
        raw: &str,
        mode: TokenMode,
        now: i64,
    ) -> Result<SessionClaims, TokenError> {
        let token = Token::<Unverified>::parse(raw, mode)?;

        let authenticated = match mode {
            TokenMode::SymmetricSign => token.authenticate_hmac(&self.config.secret)?,
            TokenMode::AsymmetricSign => {
                let kid = require_kid(&token)?;
                let jwk = self.resolve_published(&kid)?;
                token.authenticate_signature(&jwk)?
            }
            TokenMode::SymmetricEncrypt => token.decrypt_direct(&self.config.secret)?,
            TokenMode::AsymmetricEncrypt => {
                let kid = require_kid(&token)?;
                let pair = self
                    .store
                    .find_private_key(&kid)
                    .ok_or(TokenError::UnknownKey { kid })?;
                token.decrypt_wrapped(&pair)?
            }
        };

        let verified =
            authenticated.validate_claims(&self.config.issuer, &self.config.audience, now)?;

        Ok(verified.into_claims())
    }

    /// Boundary entry point for request authentication.
    ///
    /// Flattens every failure into [`Unauthorized`] so the caller cannot
    /// distinguish which check failed; the reason code is logged here and
    /// nowhere else.
    pub fn authorize(&self, raw: &str, mode: TokenMode) -> Result<SessionClaims, Unauthorized> {
        self.verify(raw, mode).map_err(|err| {
            warn!(
                code = %err.code().as_str(),
                mode = %mode.as_str(),
                misconfiguration = err.is_misconfiguration(),
                "token rejected"
            );
            Unauthorized::from(err)
        })
    }

    /// Resolve a signing key through the published key set, exactly as an
    /// external verifier would.
    fn resolve_published(&self, kid: &str) -> Result<Jwk, TokenError> {
        let jwks = match self.publisher.public_key_set() {
            Ok(jwks) => jwks,
            // An empty store knows no kid at all; for a hostile token that
            // is an unknown key, not a service misconfiguration.
            Err(TokenError::NotReady) => {
                return Err(TokenError::UnknownKey {
                    kid: kid.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        jwks.find_key(kid).cloned().ok_or_else(|| TokenError::UnknownKey {
            kid: kid.to_string(),
        })
    }
}

fn require_kid(token: &Token<Unverified>) -> Result<String, TokenError> {
    token
        .kid()
        .map(str::to_string)
        .ok_or_else(|| TokenError::MalformedToken {
            reason: "missing key id".to_string(),
        })
}
