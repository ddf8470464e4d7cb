//! # Account Keys
//!
//! Ed25519 keypairs for TermVault account holders.
//!
//! An account's [`Address`](crate::identity::Address) is derived from its
//! Ed25519 public key, and the same key signs user-decryption requests. The
//! key never touches ledger state directly: the ledger only ever sees the
//! derived address.
//!
//! ## Security considerations
//!
//! - Secret keys are zeroized on drop (ed25519-dalek does this for us).
//! - Key generation uses `OsRng`.
//! - Key bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::config::{SIGNATURE_LENGTH, SIGNING_KEY_LENGTH, VERIFYING_KEY_LENGTH};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature bytes: expected {SIGNATURE_LENGTH} bytes")]
    InvalidSignature,
}

/// An account keypair wrapping an Ed25519 signing key.
///
/// Deliberately not `Serialize`. Exporting a secret key should be an
/// explicit call to [`secret_key_bytes`](Self::secret_key_bytes), never a
/// side effect of putting a struct in a JSON response.
///
/// # Examples
///
/// ```
/// use termvault_protocol::crypto::keys::AccountKeypair;
///
/// let kp = AccountKeypair::generate();
/// let sig = kp.sign(b"decrypt my balance");
/// assert!(kp.public_key().verify(b"decrypt my balance", &sig));
/// ```
pub struct AccountKeypair {
    signing_key: SigningKey,
}

/// The public half of an account keypair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountPublicKey {
    bytes: [u8; VERIFYING_KEY_LENGTH],
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AccountSignature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl AccountKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Weak seed, weak key.
    pub fn from_seed(seed: &[u8; SIGNING_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load a keypair from a hex-encoded 32-byte secret.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SIGNING_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The public key for this keypair.
    pub fn public_key(&self) -> AccountPublicKey {
        AccountPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign `message`. Ed25519 is deterministic: same key, same message,
    /// same signature.
    pub fn sign(&self, message: &[u8]) -> AccountSignature {
        AccountSignature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    /// Raw secret key material. Handle with extreme care.
    pub fn secret_key_bytes(&self) -> [u8; SIGNING_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for AccountKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for AccountKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// AccountPublicKey
// ---------------------------------------------------------------------------

impl AccountPublicKey {
    /// Validate and wrap 32 public key bytes.
    pub fn from_bytes(bytes: [u8; VERIFYING_KEY_LENGTH]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        let arr: [u8; VERIFYING_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(arr)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_LENGTH] {
        &self.bytes
    }

    /// Verify `signature` over `message`. A yes/no answer; callers that need
    /// a typed error wrap this themselves.
    pub fn verify(&self, message: &[u8], signature: &AccountSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&signature.bytes);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hex-encoded key, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Display for AccountPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for AccountPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.bytes.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; VERIFYING_KEY_LENGTH]>::deserialize(deserializer)?;
            Self::from_bytes(bytes).map_err(serde::de::Error::custom)
        }
    }
}

// ---------------------------------------------------------------------------
// AccountSignature
// ---------------------------------------------------------------------------

impl AccountSignature {
    /// Wrap raw signature bytes. No validation happens until `verify`.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    /// Hex-encoded signature, 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        let arr: [u8; SIGNATURE_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes: arr })
    }
}

impl fmt::Debug for AccountSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "AccountSignature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

impl Serialize for AccountSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.bytes)
        }
    }
}

impl<'de> Deserialize<'de> for AccountSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; SIGNATURE_LENGTH] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| serde::de::Error::custom(KeyError::InvalidSignature))?;
            Ok(Self { bytes: arr })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = AccountKeypair::generate();
        let sig = kp.sign(b"withdraw deposit 1");
        assert!(kp.public_key().verify(b"withdraw deposit 1", &sig));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = AccountKeypair::generate();
        let sig = kp.sign(b"correct");
        assert!(!kp.public_key().verify(b"wrong", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = AccountKeypair::generate();
        let kp2 = AccountKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public_key().verify(b"message", &sig));
    }

    #[test]
    fn deterministic_from_seed() {
        let seed = [42u8; 32];
        assert_eq!(
            AccountKeypair::from_seed(&seed).public_key(),
            AccountKeypair::from_seed(&seed).public_key()
        );
    }

    #[test]
    fn secret_hex_roundtrip() {
        let kp = AccountKeypair::generate();
        let restored = AccountKeypair::from_hex(&hex::encode(kp.secret_key_bytes())).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn invalid_secret_hex_rejected() {
        assert!(AccountKeypair::from_hex("deadbeef").is_err());
        assert!(AccountKeypair::from_hex("not-hex").is_err());
    }

    #[test]
    fn public_key_json_is_hex_string() {
        let pk = AccountKeypair::from_seed(&[1u8; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        let back: AccountPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn signature_binary_roundtrip() {
        let kp = AccountKeypair::generate();
        let sig = kp.sign(b"bincode");
        let bytes = bincode::serialize(&sig).unwrap();
        let back: AccountSignature = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = AccountKeypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("AccountKeypair(pub="));
        assert!(!debug_str.contains(&hex::encode(kp.secret_key_bytes())));
    }
}
