//! Key pair generation and the in-memory key store.
//!
//! Pairs live only for the process lifetime. The store is append-only: a
//! generated pair is never removed, so any token issued earlier in the
//! process can still resolve its key. Generation happens outside the lock;
//! readers observe a pair fully constructed or not at all.

use crate::error::TokenError;
use rand::thread_rng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;
use zeroize::Zeroizing;

const RSA_KEY_BITS: usize = 2048;

/// An RSA-2048 key pair with its key identifier.
///
/// Immutable once created. The private half never leaves this type; the
/// DER encoding kept alongside it exists only to feed the JWT signer.
pub struct KeyPair {
    kid: String,
    private: RsaPrivateKey,
    public: RsaPublicKey,
    signing_der: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    /// Generate a fresh pair with a random key id.
    fn generate() -> Result<Self, TokenError> {
        let mut rng = thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| TokenError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        let signing_der = private
            .to_pkcs1_der()
            .map_err(|e| TokenError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            kid: Uuid::new_v4().to_string(),
            private,
            public,
            signing_der: Zeroizing::new(signing_der.as_bytes().to_vec()),
        })
    }

    /// Key identifier, unique per process.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public half of the pair.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Encoding key for PS256 signing.
    pub(crate) fn encoding_key(&self) -> jsonwebtoken::EncodingKey {
        jsonwebtoken::EncodingKey::from_rsa_der(&self.signing_der)
    }

    /// Wrap a content-encryption key with the public half (RSA-OAEP-256).
    pub(crate) fn wrap_cek(&self, cek: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut rng = thread_rng();
        self.public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), cek)
            .map_err(|e| TokenError::Internal(format!("key wrap failed: {e}")))
    }

    /// Unwrap a content-encryption key with the private half.
    pub(crate) fn unwrap_cek(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, TokenError> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| TokenError::DecryptionFailed)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// Append-only store of every pair generated in this process.
#[derive(Debug, Default)]
pub struct KeyStore {
    pairs: RwLock<Vec<Arc<KeyPair>>>,
}

impl KeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_pairs(&self) -> RwLockReadGuard<'_, Vec<Arc<KeyPair>>> {
        // Append-only data cannot be left torn, so a poisoned lock is safe
        // to adopt.
        self.pairs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_pairs(&self) -> RwLockWriteGuard<'_, Vec<Arc<KeyPair>>> {
        self.pairs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate a fresh pair and append it to the store.
    ///
    /// Generation runs outside the lock; concurrent verifications never
    /// observe a partially constructed pair.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyGeneration`] if RSA generation fails.
    pub fn generate_pair(&self) -> Result<Arc<KeyPair>, TokenError> {
        let pair = Arc::new(KeyPair::generate()?);

        self.write_pairs().push(Arc::clone(&pair));
        info!(kid = %pair.kid(), "generated signing key pair");

        Ok(pair)
    }

    /// Generate `count` pairs, as done once at startup.
    ///
    /// # Errors
    ///
    /// Returns the first generation failure.
    pub fn bootstrap(&self, count: usize) -> Result<(), TokenError> {
        for _ in 0..count {
            self.generate_pair()?;
        }
        Ok(())
    }

    /// Resolve a pair (private half included) by key id.
    #[must_use]
    pub fn find_private_key(&self, kid: &str) -> Option<Arc<KeyPair>> {
        self.read_pairs().iter().find(|p| p.kid() == kid).cloned()
    }

    /// The most recently generated pair, used for all new issuance.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<KeyPair>> {
        self.read_pairs().last().cloned()
    }

    /// Public halves of all pairs, oldest first.
    #[must_use]
    pub fn public_keys(&self) -> Vec<(String, RsaPublicKey)> {
        self.read_pairs()
            .iter()
            .map(|p| (p.kid().to_string(), p.public_key().clone()))
            .collect()
    }

    /// Number of pairs generated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_pairs().len()
    }

    /// True until the first pair is generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_pairs().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_starts_empty() {
        let store = KeyStore::new();
        assert!(store.is_empty());
        assert!(store.latest().is_none());
        assert!(store.find_private_key("nope").is_none());
    }

    #[test]
    fn test_generate_appends_and_resolves() {
        let store = KeyStore::new();

        let first = store.generate_pair().unwrap();
        let second = store.generate_pair().unwrap();

        assert_eq!(store.len(), 2);
        assert_ne!(first.kid(), second.kid());

        // Latest wins for issuance, both stay resolvable.
        assert_eq!(store.latest().unwrap().kid(), second.kid());
        assert!(store.find_private_key(first.kid()).is_some());

        let ordered: Vec<String> = store.public_keys().into_iter().map(|(kid, _)| kid).collect();
        assert_eq!(ordered, vec![first.kid().to_string(), second.kid().to_string()]);
    }

    #[test]
    fn test_cek_wrap_round_trip() {
        let store = KeyStore::new();
        let pair = store.generate_pair().unwrap();

        let cek = [42u8; 32];
        let wrapped = pair.wrap_cek(&cek).unwrap();
        assert_ne!(wrapped.as_slice(), cek.as_slice());

        let unwrapped = pair.unwrap_cek(&wrapped).unwrap();
        assert_eq!(unwrapped.as_slice(), cek.as_slice());
    }

    #[test]
    fn test_unwrap_garbage_fails() {
        let store = KeyStore::new();
        let pair = store.generate_pair().unwrap();

        let err = pair.unwrap_cek(&[0u8; 256]).unwrap_err();
        assert!(matches!(err, TokenError::DecryptionFailed));
    }
}
