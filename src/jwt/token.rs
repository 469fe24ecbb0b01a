//! Type-state token wrapper enforcing the verification pipeline.
//!
//! A raw token moves through `Unverified -> Authenticated -> Verified`;
//! claims are only reachable in the final state, so a caller cannot act on
//! a claim set whose signature or registered claims were never checked.

use std::marker::PhantomData;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::SymmetricSecret;
use crate::error::TokenError;
use crate::jwe;
use crate::jwks::Jwk;
use crate::jwt::claims::SessionClaims;
use crate::keys::KeyPair;

// ============================================================================
// Sealed trait pattern for token states
// ============================================================================

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token verification states.
pub trait TokenState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Parsed and shape-checked, nothing proven yet.
pub struct Unverified;
impl private::Sealed for Unverified {}
impl TokenState for Unverified {
    fn state_name() -> &'static str {
        "Unverified"
    }
}

/// Signature verified or ciphertext authenticated and decrypted.
pub struct Authenticated;
impl private::Sealed for Authenticated {}
impl TokenState for Authenticated {
    fn state_name() -> &'static str {
        "Authenticated"
    }
}

/// Registered claims checked; the claim set is trustworthy.
pub struct Verified;
impl private::Sealed for Verified {}
impl TokenState for Verified {
    fn state_name() -> &'static str {
        "Verified"
    }
}

// ============================================================================
// Token mode
// ============================================================================

/// The four issuance/verification modes.
///
/// A tagged variant rather than is-asymmetric/is-encrypted flags, so a
/// mode always names exactly one header shape and key source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Three segments, HS256 MAC with the shared secret
    SymmetricSign,
    /// Three segments, PS256 signature with the latest pair; header carries `kid`
    AsymmetricSign,
    /// Five segments, A256GCM keyed directly by the shared secret
    SymmetricEncrypt,
    /// Five segments, per-token content key wrapped with RSA-OAEP-256;
    /// header carries `kid`
    AsymmetricEncrypt,
}

impl TokenMode {
    /// Whether this mode produces the five-segment encrypted shape.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::SymmetricEncrypt | Self::AsymmetricEncrypt)
    }

    /// Dot-separated segment count for this mode's shape.
    #[must_use]
    pub const fn segment_count(self) -> usize {
        if self.is_encrypted() {
            5
        } else {
            3
        }
    }

    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SymmetricSign => "symmetric-sign",
            Self::AsymmetricSign => "asymmetric-sign",
            Self::SymmetricEncrypt => "symmetric-encrypt",
            Self::AsymmetricEncrypt => "asymmetric-encrypt",
        }
    }
}

/// Protected header common to both token shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenHeader {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::MalformedToken {
            reason: format!("{what} is not base64url: {e}"),
        })
}

/// Signature-only validation: claim checks happen in a later state so that
/// authentication failures and claim failures stay distinct.
fn signature_only(alg: Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

// ============================================================================
// Type-state token wrapper
// ============================================================================

/// A token captured at one point of the verification pipeline.
pub struct Token<S: TokenState> {
    raw: String,
    mode: TokenMode,
    header: TokenHeader,
    segments: Vec<String>,
    claims: Option<SessionClaims>,
    _state: PhantomData<S>,
}

impl<S: TokenState> std::fmt::Debug for Token<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("state", &S::state_name())
            .field("mode", &self.mode)
            .field("header", &self.header)
            .field("segments", &self.segments)
            .field("claims", &self.claims)
            .finish()
    }
}

impl<S: TokenState> Token<S> {
    /// Current state name.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }

    /// Mode the token was parsed against.
    #[must_use]
    pub fn mode(&self) -> TokenMode {
        self.mode
    }

    /// Key id from the header, when the mode carries one.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    fn transition<T: TokenState>(self, claims: Option<SessionClaims>) -> Token<T> {
        Token {
            raw: self.raw,
            mode: self.mode,
            header: self.header,
            segments: self.segments,
            claims,
            _state: PhantomData,
        }
    }
}

impl Token<Unverified> {
    /// Split a raw token and check it against the declared mode.
    ///
    /// The segment count must match the mode's shape and the decoded
    /// header must declare the mode's algorithms; any disagreement is a
    /// [`TokenError::MalformedToken`].
    pub fn parse(raw: &str, mode: TokenMode) -> Result<Self, TokenError> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.len() != mode.segment_count() {
            return Err(TokenError::MalformedToken {
                reason: format!(
                    "expected {} segments for {}, found {}",
                    mode.segment_count(),
                    mode.as_str(),
                    segments.len()
                ),
            });
        }

        let header_bytes = decode_segment(&segments[0], "header")?;
        let header: TokenHeader =
            serde_json::from_slice(&header_bytes).map_err(|e| TokenError::MalformedToken {
                reason: format!("header is not valid JSON: {e}"),
            })?;

        Self::check_header(&header, mode)?;

        Ok(Token {
            raw: raw.to_string(),
            mode,
            header,
            segments,
            claims: None,
            _state: PhantomData,
        })
    }

    fn check_header(header: &TokenHeader, mode: TokenMode) -> Result<(), TokenError> {
        let matches = match mode {
            TokenMode::SymmetricSign => header.alg == "HS256" && header.enc.is_none(),
            TokenMode::AsymmetricSign => header.alg == "PS256" && header.kid.is_some(),
            TokenMode::SymmetricEncrypt => {
                header.alg == "dir" && header.enc.as_deref() == Some("A256GCM")
            }
            TokenMode::AsymmetricEncrypt => {
                header.alg == "RSA-OAEP-256"
                    && header.enc.as_deref() == Some("A256GCM")
                    && header.kid.is_some()
            }
        };

        if matches {
            Ok(())
        } else {
            Err(TokenError::MalformedToken {
                reason: format!("header does not describe a {} token", mode.as_str()),
            })
        }
    }

    /// Verify the HS256 MAC with the shared secret.
    pub fn authenticate_hmac(
        self,
        secret: &SymmetricSecret,
    ) -> Result<Token<Authenticated>, TokenError> {
        let key = DecodingKey::from_secret(secret.as_bytes());
        let data = jsonwebtoken::decode::<SessionClaims>(
            &self.raw,
            &key,
            &signature_only(Algorithm::HS256),
        )?;

        Ok(self.transition(Some(data.claims)))
    }

    /// Verify the PS256 signature against a published key.
    pub fn authenticate_signature(self, jwk: &Jwk) -> Result<Token<Authenticated>, TokenError> {
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| TokenError::Internal(format!("published key unusable: {e}")))?;
        let data = jsonwebtoken::decode::<SessionClaims>(
            &self.raw,
            &key,
            &signature_only(Algorithm::PS256),
        )?;

        Ok(self.transition(Some(data.claims)))
    }

    /// Decrypt a direct-mode token with the shared secret.
    pub fn decrypt_direct(
        self,
        secret: &SymmetricSecret,
    ) -> Result<Token<Authenticated>, TokenError> {
        if !self.segments[1].is_empty() {
            return Err(TokenError::MalformedToken {
                reason: "direct encryption carries no encrypted key".to_string(),
            });
        }

        self.open_payload(secret.as_bytes())
    }

    /// Unwrap the content key with a private pair, then decrypt.
    pub fn decrypt_wrapped(self, pair: &KeyPair) -> Result<Token<Authenticated>, TokenError> {
        let wrapped = decode_segment(&self.segments[1], "encrypted key")?;
        if wrapped.is_empty() {
            return Err(TokenError::MalformedToken {
                reason: "missing encrypted key segment".to_string(),
            });
        }

        let cek = pair.unwrap_cek(&wrapped)?;
        let cek: Zeroizing<[u8; jwe::CEK_LEN]> = Zeroizing::new(
            <[u8; jwe::CEK_LEN]>::try_from(cek.as_slice())
                .map_err(|_| TokenError::DecryptionFailed)?,
        );

        self.open_payload(&cek)
    }

    fn open_payload(self, key: &[u8; jwe::CEK_LEN]) -> Result<Token<Authenticated>, TokenError> {
        let iv = decode_segment(&self.segments[2], "initialization vector")?;
        let ciphertext = decode_segment(&self.segments[3], "ciphertext")?;
        let tag = decode_segment(&self.segments[4], "authentication tag")?;

        let plaintext = jwe::open(&self.segments[0], key, &iv, &ciphertext, &tag)?;

        let claims: SessionClaims =
            serde_json::from_slice(&plaintext).map_err(|e| TokenError::MalformedToken {
                reason: format!("decrypted claims are not valid JSON: {e}"),
            })?;

        Ok(self.transition(Some(claims)))
    }
}

impl Token<Authenticated> {
    /// Check registered claims and transition to the final state.
    ///
    /// Issuer and audience must equal the deployment constants and `now`
    /// must fall before expiration; any mismatch, including expiry, is a
    /// [`TokenError::ClaimValidationFailed`].
    pub fn validate_claims(
        self,
        issuer: &str,
        audience: &str,
        now: i64,
    ) -> Result<Token<Verified>, TokenError> {
        let claims = self
            .claims
            .as_ref()
            .ok_or_else(|| TokenError::Internal("claims missing after authentication".to_string()))?;

        if claims.iss != issuer {
            return Err(TokenError::ClaimValidationFailed {
                reason: "issuer mismatch".to_string(),
            });
        }
        if claims.aud != audience {
            return Err(TokenError::ClaimValidationFailed {
                reason: "audience mismatch".to_string(),
            });
        }
        if !claims.is_valid_at(now) {
            return Err(TokenError::ClaimValidationFailed {
                reason: "token expired".to_string(),
            });
        }

        Ok(Token {
            raw: self.raw,
            mode: self.mode,
            header: self.header,
            segments: self.segments,
            claims: self.claims,
            _state: PhantomData,
        })
    }

    /// Read-only access before claim validation, for diagnostics only.
    #[must_use]
    pub fn peek_claims(&self) -> Option<&SessionClaims> {
        self.claims.as_ref()
    }
}

impl Token<Verified> {
    /// The verified claim set.
    #[must_use]
    pub fn claims(&self) -> &SessionClaims {
        self.claims.as_ref().expect("verified token must have claims")
    }

    /// Consume the token, yielding the verified claim set.
    #[must_use]
    pub fn into_claims(self) -> SessionClaims {
        self.claims.expect("verified token must have claims")
    }

    /// Raw token string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_counts() {
        assert_eq!(TokenMode::SymmetricSign.segment_count(), 3);
        assert_eq!(TokenMode::AsymmetricSign.segment_count(), 3);
        assert_eq!(TokenMode::SymmetricEncrypt.segment_count(), 5);
        assert_eq!(TokenMode::AsymmetricEncrypt.segment_count(), 5);
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        let err = Token::<Unverified>::parse("a.b", TokenMode::SymmetricSign).unwrap_err();
        assert!(matches!(err, TokenError::MalformedToken { .. }));

        let err = Token::<Unverified>::parse("a.b.c", TokenMode::SymmetricEncrypt).unwrap_err();
        assert!(matches!(err, TokenError::MalformedToken { .. }));
    }

    #[test]
    fn test_parse_rejects_garbage_header() {
        let err = Token::<Unverified>::parse("!!!.claims.sig", TokenMode::SymmetricSign).unwrap_err();
        assert!(matches!(err, TokenError::MalformedToken { .. }));
    }

    #[test]
    fn test_parse_rejects_algorithm_mode_disagreement() {
        // {"alg":"HS256"} presented as an asymmetric-sign token
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let raw = format!("{header}.claims.sig");

        let err = Token::<Unverified>::parse(&raw, TokenMode::AsymmetricSign).unwrap_err();
        assert!(matches!(err, TokenError::MalformedToken { .. }));
    }

    #[test]
    fn test_parse_requires_kid_for_wrapped_modes() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RSA-OAEP-256","enc":"A256GCM"}"#);
        let raw = format!("{header}.k.iv.ct.tag");

        let err = Token::<Unverified>::parse(&raw, TokenMode::AsymmetricEncrypt).unwrap_err();
        assert!(matches!(err, TokenError::MalformedToken { .. }));
    }

    #[test]
    fn test_state_names() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let raw = format!("{header}.claims.sig");
        let token = Token::<Unverified>::parse(&raw, TokenMode::SymmetricSign).unwrap();

        assert_eq!(token.state_name(), "Unverified");
        assert_eq!(token.mode(), TokenMode::SymmetricSign);
        assert!(token.kid().is_none());
    }
}
