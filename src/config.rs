//! Deployment configuration.
//!
//! All configuration is loaded from environment variables and validated at
//! startup. The issuer and audience are fixed constants for a deployment;
//! the symmetric secret is shared with verifiers out of band and never
//! rotated at runtime.

use crate::error::TokenError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::env;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Development fallback secret, matching the default deployment. Override
/// with `SESSION_SECRET` in anything that is not a local sandbox.
const DEV_FALLBACK_SECRET: &str = "zH4NRP1HMALxxCFnRZABFA7GOJtzU_gIj02alfL1lvI";

/// The 32-byte secret shared by issuer and verifier.
///
/// Keys the HS256 MAC and the direct-mode A256GCM encryption. Zeroized on
/// drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricSecret([u8; 32]);

impl SymmetricSecret {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Decode a base64url (unpadded) encoded secret.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] unless the input decodes to exactly
    /// 32 bytes.
    pub fn from_base64url(encoded: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| TokenError::Config(format!("invalid SESSION_SECRET: {e}")))?;

        let len = bytes.len();
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TokenError::Config(format!("SESSION_SECRET must be 32 bytes, got {len}")))?;

        Ok(Self(arr))
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricSecret([redacted])")
    }
}

/// Token service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `iss` claim stamped into every issued token
    pub issuer: String,
    /// `aud` claim stamped into every issued token
    pub audience: String,
    /// Shared symmetric secret
    pub secret: SymmetricSecret,
}

impl Config {
    /// Build a configuration from explicit values.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, secret: SymmetricSecret) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            secret,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `SESSION_SECRET` is set but does not decode to
    /// 32 bytes.
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();

        let issuer = env::var("SESSION_ISSUER").unwrap_or_else(|_| "urn:example:issuer".to_string());
        let audience =
            env::var("SESSION_AUDIENCE").unwrap_or_else(|_| "urn:example:audience".to_string());

        let secret = match env::var("SESSION_SECRET") {
            Ok(encoded) => SymmetricSecret::from_base64url(&encoded)?,
            Err(_) => SymmetricSecret::from_base64url(DEV_FALLBACK_SECRET)?,
        };

        Ok(Self {
            issuer,
            audience,
            secret,
        })
    }
}
