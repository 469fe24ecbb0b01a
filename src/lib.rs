//! Session token service core.
//!
//! Issues signed or encrypted bearer tokens for an authenticated session,
//! validates them, and publishes the public key set third parties need to
//! verify asymmetrically signed tokens without contacting the issuer.
//! Transport, credential checking, and persistence live elsewhere; this
//! crate owns key-pair lifecycle, token construction, token validation,
//! and the key-set projection.
//!
//! Key material lives only for the process lifetime. A restart invalidates
//! asymmetric tokens (their key id no longer resolves); symmetric tokens
//! stay valid as long as the configured secret is reloaded unchanged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
mod jwe;
pub mod jwks;
pub mod jwt;
pub mod keys;

// Re-exports for convenience
pub use config::{Config, SymmetricSecret};
pub use error::{ErrorCode, TokenError, Unauthorized};
pub use jwks::{Jwk, Jwks, KeyPublisher};
pub use jwt::{SessionClaims, TokenIssuer, TokenMode, TokenVerifier, TOKEN_TTL_SECS};
pub use keys::{KeyPair, KeyStore};
