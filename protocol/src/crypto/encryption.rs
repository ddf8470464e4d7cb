//! # AES-256-GCM Sealing
//!
//! Authenticated encryption for everything TermVault keeps secret: the
//! plaintext behind every ciphertext handle in the coprocessor store, and
//! the re-encrypted values handed back to users during decryption.
//!
//! Every seal binds its associated data (AAD). The coprocessor uses the
//! ciphertext handle as AAD, so a sealed value copied under a different
//! handle fails authentication instead of silently decrypting to someone
//! else's balance.
//!
//! ## Nonce management
//!
//! Random 96-bit nonces from `OsRng`. The birthday bound is ~2^48 seals per
//! key, which is comfortably beyond the number of balance updates a single
//! network key will ever see.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Errors that can occur during sealing/opening.
///
/// Kept deliberately vague. The difference between "wrong key", "wrong AAD"
/// and "corrupted ciphertext" is none of an attacker's business.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key, wrong context or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: must carry at least the {AES_TAG_LENGTH}-byte tag")]
    CiphertextTooShort,
}

/// A sealed payload: the random nonce plus the ciphertext with its GCM tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// The 96-bit nonce used for this seal.
    pub nonce: [u8; AES_NONCE_LENGTH],
    /// Ciphertext followed by the 16-byte authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Total size on the wire (nonce + ciphertext + tag).
    pub fn len(&self) -> usize {
        AES_NONCE_LENGTH + self.ciphertext.len()
    }

    /// A sealed payload always carries at least a nonce, so this is never true
    /// for anything produced by [`seal`].
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

/// Seal `plaintext` under `key`, authenticating `aad` alongside it.
///
/// # Example
///
/// ```
/// use termvault_protocol::crypto::encryption::{open, seal};
///
/// let key = [0x42u8; 32];
/// let sealed = seal(&key, &100u64.to_le_bytes(), b"handle").unwrap();
/// let opened = open(&key, &sealed, b"handle").unwrap();
/// assert_eq!(opened, 100u64.to_le_bytes());
/// ```
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedPayload, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    Ok(SealedPayload { nonce, ciphertext })
}

/// Open a payload produced by [`seal`]. The AAD must match byte for byte.
pub fn open(
    key: &[u8; AES_KEY_LENGTH],
    sealed: &SealedPayload,
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if sealed.ciphertext.len() < AES_TAG_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Seal a `u64` amount in little-endian form.
pub fn seal_u64(
    key: &[u8; AES_KEY_LENGTH],
    value: u64,
    aad: &[u8],
) -> Result<SealedPayload, EncryptionError> {
    seal(key, &value.to_le_bytes(), aad)
}

/// Open a payload that must contain exactly one little-endian `u64`.
pub fn open_u64(
    key: &[u8; AES_KEY_LENGTH],
    sealed: &SealedPayload,
    aad: &[u8],
) -> Result<u64, EncryptionError> {
    let bytes = open(key, sealed, aad)?;
    let arr: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| EncryptionError::DecryptFailed)?;
    Ok(u64::from_le_bytes(arr))
}
