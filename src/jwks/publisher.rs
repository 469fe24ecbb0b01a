//! JWKS projection of the key store.
//!
//! The published document contains only public parameters. It is
//! recomputed on every call so a pair generated a moment ago is already
//! visible to verifiers fetching the set.

use crate::error::TokenError;
use crate::keys::KeyStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single published RSA public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type, always `RSA`
    pub kty: String,
    /// Key id matching the `kid` header of tokens signed with this pair
    pub kid: String,
    /// Key use, always `sig`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Signing algorithm, always `PS256`
    pub alg: String,
    /// Modulus, base64url without padding
    pub n: String,
    /// Public exponent, base64url without padding
    pub e: String,
}

impl Jwk {
    /// Project the public half of a pair into the exchange format.
    #[must_use]
    pub fn from_public_key(kid: &str, key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: kid.to_string(),
            key_use: "sig".to_string(),
            alg: "PS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }
}

/// The published key set document, `{"keys": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Jwks {
    /// Published keys, oldest first
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Find a key by its id.
    #[must_use]
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Serialize to the JSON document served at the discovery endpoint.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Read-only projection of [`KeyStore`] public halves.
#[derive(Debug, Clone)]
pub struct KeyPublisher {
    store: Arc<KeyStore>,
}

impl KeyPublisher {
    /// Create a publisher over the given store.
    #[must_use]
    pub fn new(store: Arc<KeyStore>) -> Self {
        Self { store }
    }

    /// Current public key set.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NotReady`] until at least one pair has been
    /// generated.
    pub fn public_key_set(&self) -> Result<Jwks, TokenError> {
        let public = self.store.public_keys();
        if public.is_empty() {
            return Err(TokenError::NotReady);
        }

        Ok(Jwks {
            keys: public
                .iter()
                .map(|(kid, key)| Jwk::from_public_key(kid, key))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_is_not_ready() {
        let publisher = KeyPublisher::new(Arc::new(KeyStore::new()));
        let err = publisher.public_key_set().unwrap_err();
        assert!(matches!(err, TokenError::NotReady));
    }

    #[test]
    fn test_new_pairs_visible_immediately() {
        let store = Arc::new(KeyStore::new());
        let publisher = KeyPublisher::new(Arc::clone(&store));

        let first = store.generate_pair().unwrap();
        let jwks = publisher.public_key_set().unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, first.kid());

        let second = store.generate_pair().unwrap();
        let jwks = publisher.public_key_set().unwrap();
        assert_eq!(jwks.keys.len(), 2);
        assert!(jwks.find_key(second.kid()).is_some());
    }

    #[test]
    fn test_jwk_shape() {
        let store = Arc::new(KeyStore::new());
        let pair = store.generate_pair().unwrap();

        let jwk = Jwk::from_public_key(pair.kid(), pair.public_key());
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "PS256");
        // 2048-bit modulus is 256 bytes before encoding
        assert!(jwk.n.len() > 300);
        assert_eq!(jwk.e, "AQAB");
    }
}
