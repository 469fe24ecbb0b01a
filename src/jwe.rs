//! Authenticated encryption for the five-segment token shape.
//!
//! Implements the A256GCM content encryption shared by both encrypted
//! modes. The base64url form of the protected header is the additional
//! authenticated data, so a swapped header fails the tag check.

use crate::error::TokenError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

pub(crate) const CEK_LEN: usize = 32;
pub(crate) const IV_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;

/// Output of content encryption: the three trailing token segments.
pub(crate) struct Sealed {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Encrypt `plaintext` under `key`, binding the protected header.
pub(crate) fn seal(header_b64: &str, key: &[u8; CEK_LEN], plaintext: &[u8]) -> Result<Sealed, TokenError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut combined = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Internal("content encryption failed".to_string()))?;

    let tag = combined.split_off(combined.len() - TAG_LEN);

    Ok(Sealed {
        iv,
        ciphertext: combined,
        tag,
    })
}

/// Decrypt and authenticate the trailing segments of an encrypted token.
pub(crate) fn open(
    header_b64: &str,
    key: &[u8; CEK_LEN],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, TokenError> {
    if iv.len() != IV_LEN {
        return Err(TokenError::MalformedToken {
            reason: format!("initialization vector must be {IV_LEN} bytes"),
        });
    }
    if tag.len() != TAG_LEN {
        return Err(TokenError::MalformedToken {
            reason: format!("authentication tag must be {TAG_LEN} bytes"),
        });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: &combined,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|_| TokenError::DecryptionFailed)
}
