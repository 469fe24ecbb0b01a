//! Error types for token issuance and validation.
//!
//! Every failure in this crate is local and recoverable. Internally the
//! taxonomy stays fine-grained so operators can tell misconfiguration from
//! hostile input; at the authentication boundary everything collapses into
//! a single opaque [`Unauthorized`] value so a remote caller learns nothing
//! about which check failed.

use thiserror::Error;

/// Non-exhaustive error enum for forward compatibility.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TokenError {
    /// No key pair has been generated yet; signing and publishing require one
    #[error("key store is empty")]
    NotReady,

    /// An asymmetric mode was requested but no key pair exists
    #[error("no signing key pair available")]
    KeyUnavailable,

    /// The key id referenced by a token is not in the known set
    #[error("unknown key id: {kid}")]
    UnknownKey {
        /// Key id the token asked for
        kid: String,
    },

    /// Token structure could not be decoded
    #[error("malformed token: {reason}")]
    MalformedToken {
        /// Description of the structural failure
        reason: String,
    },

    /// Signature or MAC did not verify
    #[error("token signature invalid")]
    InvalidSignature,

    /// Authenticated decryption failed (wrong key, altered ciphertext or tag)
    #[error("token decryption failed")]
    DecryptionFailed,

    /// Authentication succeeded but a registered claim check did not
    #[error("claim validation failed: {reason}")]
    ClaimValidationFailed {
        /// Which claim check failed
        reason: String,
    },

    /// Key pair generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable reason codes retained for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Key store empty at a point that requires a pair
    NotReady,
    /// No pair available for an asymmetric operation
    KeyUnavailable,
    /// Referenced key id not in the known set
    UnknownKey,
    /// Structural decode failure
    Malformed,
    /// Signature/MAC mismatch
    SignatureInvalid,
    /// AEAD or key-unwrap failure
    DecryptionFailed,
    /// issuer/audience/expiry mismatch
    ClaimsInvalid,
    /// Key pair generation failure
    KeyGeneration,
    /// Bad configuration
    Config,
    /// Everything else
    Internal,
}

impl ErrorCode {
    /// String form used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "TOKEN_NOT_READY",
            Self::KeyUnavailable => "TOKEN_KEY_UNAVAILABLE",
            Self::UnknownKey => "TOKEN_UNKNOWN_KEY",
            Self::Malformed => "TOKEN_MALFORMED",
            Self::SignatureInvalid => "TOKEN_SIGNATURE_INVALID",
            Self::DecryptionFailed => "TOKEN_DECRYPTION_FAILED",
            Self::ClaimsInvalid => "TOKEN_CLAIMS_INVALID",
            Self::KeyGeneration => "TOKEN_KEYGEN_FAILED",
            Self::Config => "TOKEN_CONFIG_INVALID",
            Self::Internal => "TOKEN_INTERNAL",
        }
    }
}

impl TokenError {
    /// Reason code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotReady => ErrorCode::NotReady,
            Self::KeyUnavailable => ErrorCode::KeyUnavailable,
            Self::UnknownKey { .. } => ErrorCode::UnknownKey,
            Self::MalformedToken { .. } => ErrorCode::Malformed,
            Self::InvalidSignature => ErrorCode::SignatureInvalid,
            Self::DecryptionFailed => ErrorCode::DecryptionFailed,
            Self::ClaimValidationFailed { .. } => ErrorCode::ClaimsInvalid,
            Self::KeyGeneration(_) => ErrorCode::KeyGeneration,
            Self::Config(_) => ErrorCode::Config,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error points at the deployment rather than the token.
    ///
    /// Misconfiguration (no keys generated, bad secret) must not be
    /// mistaken for hostile input when triaging logs.
    #[must_use]
    pub const fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            Self::NotReady
                | Self::KeyUnavailable
                | Self::KeyGeneration(_)
                | Self::Config(_)
                | Self::Internal(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat | ErrorKind::RsaFailedSigning => {
                Self::Internal(err.to_string())
            }
            _ => Self::MalformedToken {
                reason: err.to_string(),
            },
        }
    }
}

/// Opaque authentication failure returned across the service boundary.
///
/// Display deliberately reveals nothing about which check failed; the
/// reason code stays on the value for local diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized {
    code: ErrorCode,
}

impl Unauthorized {
    /// Internal reason code, for logging. Never send this to a caller.
    #[must_use]
    pub const fn reason_code(&self) -> ErrorCode {
        self.code
    }
}

impl From<TokenError> for Unauthorized {
    fn from(err: TokenError) -> Self {
        Self { code: err.code() }
    }
}

impl std::fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unauthorized")
    }
}

impl std::error::Error for Unauthorized {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(TokenError::NotReady.code().as_str(), "TOKEN_NOT_READY");
        assert_eq!(
            TokenError::UnknownKey { kid: "k1".into() }.code().as_str(),
            "TOKEN_UNKNOWN_KEY"
        );
        assert_eq!(
            TokenError::InvalidSignature.code().as_str(),
            "TOKEN_SIGNATURE_INVALID"
        );
    }

    #[test]
    fn test_unauthorized_is_opaque() {
        let unauthorized = Unauthorized::from(TokenError::DecryptionFailed);
        assert_eq!(unauthorized.to_string(), "unauthorized");
        assert_eq!(unauthorized.reason_code(), ErrorCode::DecryptionFailed);
    }

    #[test]
    fn test_misconfiguration_split() {
        assert!(TokenError::KeyUnavailable.is_misconfiguration());
        assert!(TokenError::Config("bad secret".into()).is_misconfiguration());
        assert!(!TokenError::InvalidSignature.is_misconfiguration());
        assert!(!TokenError::MalformedToken { reason: "x".into() }.is_misconfiguration());
    }
}
