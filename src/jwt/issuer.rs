//! Token issuance.
//!
//! Every mode stamps the deployment issuer/audience and the two-hour
//! validity window before signing or encrypting. Asymmetric modes always
//! use the most recently generated pair.
//!
//! A note on `AsymmetricEncrypt`: the content key is wrapped with the
//! pair's *public* half, which the published key set hands to everyone.
//! Anyone holding that set can produce such a token, so this mode is
//! encrypted but not access-controlled. That behavior is deliberate and
//! must not be presented as confidentiality against key-set holders.

use crate::config::Config;
use crate::error::TokenError;
use crate::jwe;
use crate::jwt::claims::SessionClaims;
use crate::jwt::token::{TokenHeader, TokenMode};
use crate::keys::KeyStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use zeroize::Zeroizing;

/// Builds signed or encrypted tokens over the shared key material.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    store: Arc<KeyStore>,
    config: Arc<Config>,
}

impl TokenIssuer {
    /// Create an issuer over the given store and configuration.
    #[must_use]
    pub fn new(store: Arc<KeyStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Issue a token for `custom` application claims in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyUnavailable`] when an asymmetric mode is
    /// requested and no pair has been generated.
    #[instrument(skip(self, custom), fields(mode = %mode.as_str()))]
    pub fn issue(
        &self,
        custom: HashMap<String, serde_json::Value>,
        mode: TokenMode,
    ) -> Result<String, TokenError> {
        self.issue_at(custom, mode, chrono::Utc::now().timestamp())
    }

    /// Issue with an explicit issuance instant. Clock seam for tests.
    pub fn issue_at(
        &self,
        custom: HashMap<String, serde_json::Value>,
        mode: TokenMode,
        now: i64,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims::stamp(custom, &self.config.issuer, &self.config.audience, now);

        match mode {
            TokenMode::SymmetricSign => self.sign_hmac(&claims),
            TokenMode::AsymmetricSign => self.sign_rsa(&claims),
            TokenMode::SymmetricEncrypt => self.encrypt_direct(&claims),
            TokenMode::AsymmetricEncrypt => self.encrypt_wrapped(&claims),
        }
    }

    fn sign_hmac(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(self.config.secret.as_bytes());

        jsonwebtoken::encode(&header, claims, &key).map_err(TokenError::from)
    }

    fn sign_rsa(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let pair = self.store.latest().ok_or(TokenError::KeyUnavailable)?;

        let mut header = Header::new(Algorithm::PS256);
        header.kid = Some(pair.kid().to_string());

        jsonwebtoken::encode(&header, claims, &pair.encoding_key()).map_err(TokenError::from)
    }

    fn encrypt_direct(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header_b64 = encode_header(&TokenHeader {
            alg: "dir".to_string(),
            enc: Some("A256GCM".to_string()),
            kid: None,
        })?;

        let sealed = jwe::seal(&header_b64, self.config.secret.as_bytes(), &claims_json(claims)?)?;

        Ok(assemble(&header_b64, "", &sealed))
    }

    fn encrypt_wrapped(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let pair = self.store.latest().ok_or(TokenError::KeyUnavailable)?;

        // Fresh content key per token, wrapped with the pair's public half.
        let mut cek = Zeroizing::new([0u8; jwe::CEK_LEN]);
        rand::thread_rng().fill_bytes(&mut *cek);
        let wrapped = pair.wrap_cek(&*cek)?;

        let header_b64 = encode_header(&TokenHeader {
            alg: "RSA-OAEP-256".to_string(),
            enc: Some("A256GCM".to_string()),
            kid: Some(pair.kid().to_string()),
        })?;

        let sealed = jwe::seal(&header_b64, &cek, &claims_json(claims)?)?;

        Ok(assemble(&header_b64, &URL_SAFE_NO_PAD.encode(&wrapped), &sealed))
    }
}

fn claims_json(claims: &SessionClaims) -> Result<Vec<u8>, TokenError> {
    serde_json::to_vec(claims)
        .map_err(|e| TokenError::Internal(format!("claims serialization failed: {e}")))
}

fn encode_header(header: &TokenHeader) -> Result<String, TokenError> {
    let json = serde_json::to_vec(header)
        .map_err(|e| TokenError::Internal(format!("header serialization failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn assemble(header_b64: &str, encrypted_key_b64: &str, sealed: &jwe::Sealed) -> String {
    format!(
        "{header_b64}.{encrypted_key_b64}.{}.{}.{}",
        URL_SAFE_NO_PAD.encode(sealed.iv),
        URL_SAFE_NO_PAD.encode(&sealed.ciphertext),
        URL_SAFE_NO_PAD.encode(&sealed.tag)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymmetricSecret;

    fn test_setup() -> (Arc<KeyStore>, TokenIssuer) {
        let store = Arc::new(KeyStore::new());
        let config = Arc::new(Config::new(
            "urn:test:issuer",
            "urn:test:audience",
            SymmetricSecret::from_bytes([3u8; 32]),
        ));
        let issuer = TokenIssuer::new(Arc::clone(&store), config);
        (store, issuer)
    }

    fn username_claim() -> HashMap<String, serde_json::Value> {
        let mut custom = HashMap::new();
        custom.insert("username".to_string(), serde_json::json!("alice"));
        custom
    }

    #[test]
    fn test_symmetric_sign_shape() {
        let (_store, issuer) = test_setup();

        let token = issuer.issue(username_claim(), TokenMode::SymmetricSign).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_symmetric_encrypt_shape() {
        let (_store, issuer) = test_setup();

        let token = issuer.issue(username_claim(), TokenMode::SymmetricEncrypt).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 5);
        // Direct mode has no encrypted key
        assert!(segments[1].is_empty());
        assert!(!segments[3].is_empty());
    }

    #[test]
    fn test_asymmetric_modes_require_a_pair() {
        let (_store, issuer) = test_setup();

        let err = issuer.issue(username_claim(), TokenMode::AsymmetricSign).unwrap_err();
        assert!(matches!(err, TokenError::KeyUnavailable));

        let err = issuer.issue(username_claim(), TokenMode::AsymmetricEncrypt).unwrap_err();
        assert!(matches!(err, TokenError::KeyUnavailable));
    }

    #[test]
    fn test_asymmetric_sign_carries_latest_kid() {
        let (store, issuer) = test_setup();
        store.generate_pair().unwrap();
        let latest = store.generate_pair().unwrap();

        let token = issuer.issue(username_claim(), TokenMode::AsymmetricSign).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();

        assert_eq!(header.alg, Algorithm::PS256);
        assert_eq!(header.kid.as_deref(), Some(latest.kid()));
    }

    #[test]
    fn test_wrapped_encrypt_carries_wrapped_key() {
        let (store, issuer) = test_setup();
        let pair = store.generate_pair().unwrap();

        let token = issuer.issue(username_claim(), TokenMode::AsymmetricEncrypt).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 5);

        // 2048-bit wrap output is 256 bytes
        let wrapped = URL_SAFE_NO_PAD.decode(segments[1]).unwrap();
        assert_eq!(wrapped.len(), 256);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "RSA-OAEP-256");
        assert_eq!(header["kid"], pair.kid());
    }
}
