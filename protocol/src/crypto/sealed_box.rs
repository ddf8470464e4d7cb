//! # Sealed Boxes for Viewing Keys
//!
//! One-way encryption to a user's X25519 viewing key. This is how the
//! coprocessor hands a plaintext balance to its owner without anyone else
//! (including the node relaying the response) being able to read it.
//!
//! ## Construction
//!
//! 1. The sender generates a fresh X25519 `EphemeralSecret`.
//! 2. `shared = X25519(ephemeral, recipient_viewing_key)`.
//! 3. `key = BLAKE3-derive-key(REENCRYPTION_KDF_CONTEXT, shared || eph_pub || recipient_pub)`.
//! 4. The plaintext is sealed with AES-256-GCM under `key`.
//!
//! The ephemeral public key travels with the box. The ephemeral secret is
//! consumed by the Diffie-Hellman step and is gone by the time `seal_to`
//! returns, so a box can only ever be opened by the viewing secret.
//!
//! The raw DH output is never used as a key directly. It goes through the
//! KDF along with both public keys, binding the derived key to this exact
//! sender/recipient pair.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use super::encryption::{self, EncryptionError, SealedPayload};
use crate::config::{AES_KEY_LENGTH, REENCRYPTION_KDF_CONTEXT, VIEWING_KEY_LENGTH};

/// Errors while sealing to or opening from a viewing key.
#[derive(Debug, Error)]
pub enum SealedBoxError {
    /// The recipient key is a low-order point; DH would yield a known secret.
    #[error("invalid viewing key: non-contributory X25519 point")]
    InvalidViewingKey,

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

/// A payload sealed to a viewing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// The sender's single-use X25519 public key.
    pub ephemeral_public: [u8; VIEWING_KEY_LENGTH],
    /// AES-256-GCM payload under the derived box key.
    pub payload: SealedPayload,
}

/// A user's X25519 viewing keypair.
///
/// Unlike the ephemeral sender side, the viewing secret is static: the
/// client keeps it for as long as its decryption request is valid and
/// uses it to open every box the coprocessor returns.
pub struct ViewingKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl ViewingKeypair {
    /// Generate a fresh viewing keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a viewing keypair from its 32 secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Export the secret half. Clients persist this next to their request.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The public viewing key that goes into a decryption request.
    pub fn public_key_bytes(&self) -> [u8; VIEWING_KEY_LENGTH] {
        self.public.to_bytes()
    }

    /// Open a box sealed to this viewing key. `aad` must match the sender's.
    pub fn open(&self, sealed: &SealedBox, aad: &[u8]) -> Result<Vec<u8>, SealedBoxError> {
        let ephemeral = PublicKey::from(sealed.ephemeral_public);
        let shared = self.secret.diffie_hellman(&ephemeral);
        if !shared.was_contributory() {
            return Err(SealedBoxError::InvalidViewingKey);
        }
        let key = derive_box_key(
            shared.as_bytes(),
            &sealed.ephemeral_public,
            &self.public.to_bytes(),
        );
        Ok(encryption::open(&key, &sealed.payload, aad)?)
    }

    /// Open a box that carries one little-endian `u64`.
    pub fn open_u64(&self, sealed: &SealedBox, aad: &[u8]) -> Result<u64, SealedBoxError> {
        let bytes = self.open(sealed, aad)?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SealedBoxError::Encryption(EncryptionError::DecryptFailed))?;
        Ok(u64::from_le_bytes(arr))
    }
}

impl std::fmt::Debug for ViewingKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ViewingKeypair(pub={})", hex::encode(self.public.to_bytes()))
    }
}

/// Seal `plaintext` so that only the holder of `recipient`'s viewing secret
/// can open it.
pub fn seal_to(
    recipient: &[u8; VIEWING_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedBox, SealedBoxError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();

    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
    if !shared.was_contributory() {
        return Err(SealedBoxError::InvalidViewingKey);
    }

    let key = derive_box_key(shared.as_bytes(), &ephemeral_public, recipient);
    let payload = encryption::seal(&key, plaintext, aad)?;

    Ok(SealedBox {
        ephemeral_public,
        payload,
    })
}

/// Whether 32 bytes are usable as a viewing key (not a low-order point).
pub fn is_valid_viewing_key(bytes: &[u8; VIEWING_KEY_LENGTH]) -> bool {
    let probe = EphemeralSecret::random_from_rng(OsRng);
    probe
        .diffie_hellman(&PublicKey::from(*bytes))
        .was_contributory()
}

fn derive_box_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; VIEWING_KEY_LENGTH],
    recipient_public: &[u8; VIEWING_KEY_LENGTH],
) -> [u8; AES_KEY_LENGTH] {
    let mut hasher = blake3::Hasher::new_derive_key(REENCRYPTION_KDF_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let viewer = ViewingKeypair::generate();
        let sealed = seal_to(&viewer.public_key_bytes(), &101u64.to_le_bytes(), b"h").unwrap();
        assert_eq!(viewer.open_u64(&sealed, b"h").unwrap(), 101);
    }

    #[test]
    fn test_other_viewer_cannot_open() {
        let viewer = ViewingKeypair::generate();
        let eavesdropper = ViewingKeypair::generate();
        let sealed = seal_to(&viewer.public_key_bytes(), b"secret", b"").unwrap();
        assert!(eavesdropper.open(&sealed, b"").is_err());
    }

    #[test]
    fn test_aad_is_bound() {
        let viewer = ViewingKeypair::generate();
        let sealed = seal_to(&viewer.public_key_bytes(), b"secret", b"handle-a").unwrap();
        assert!(viewer.open(&sealed, b"handle-b").is_err());
    }

    #[test]
    fn test_fresh_ephemeral_per_box() {
        let viewer = ViewingKeypair::generate();
        let a = seal_to(&viewer.public_key_bytes(), b"x", b"").unwrap();
        let b = seal_to(&viewer.public_key_bytes(), b"x", b"").unwrap();
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
    }

    #[test]
    fn test_low_order_viewing_key_rejected() {
        // The all-zero point is the canonical low-order X25519 input.
        assert!(!is_valid_viewing_key(&[0u8; 32]));
        assert!(matches!(
            seal_to(&[0u8; 32], b"x", b""),
            Err(SealedBoxError::InvalidViewingKey)
        ));
    }

    #[test]
    fn test_secret_bytes_roundtrip() {
        let viewer = ViewingKeypair::generate();
        let restored = ViewingKeypair::from_secret_bytes(viewer.secret_bytes());
        assert_eq!(viewer.public_key_bytes(), restored.public_key_bytes());

        let sealed = seal_to(&viewer.public_key_bytes(), b"persisted", b"").unwrap();
        assert_eq!(restored.open(&sealed, b"").unwrap(), b"persisted");
    }
}
