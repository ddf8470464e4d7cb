//! # Reference Coprocessor
//!
//! A software implementation of [`EncryptedArithmetic`]. It plays the role
//! that an FHE coprocessor plays on a confidential chain: it is the only
//! component that can see plaintexts, and it only ever releases them through
//! the authorized user-decryption path in [`super::decryption`].
//!
//! ## Storage model
//!
//! | Map           | Key                | Value                                   |
//! |---------------|--------------------|-----------------------------------------|
//! | `ciphertexts` | `CiphertextHandle` | AES-256-GCM sealed `u64`, AAD = handle  |
//! | `acl`         | `CiphertextHandle` | set of addresses allowed to use it      |
//!
//! Values are sealed under a 32-byte [`NetworkKey`]. The key is never part of
//! a serialized snapshot: restoring a coprocessor from disk yields an
//! instance that refuses every operation until
//! [`attach_network_key`](Coprocessor::attach_network_key) is called.
//!
//! ## Handle derivation
//!
//! `handle = BLAKE3-derive-key(HANDLE_DERIVATION_CONTEXT, op || lhs || rhs || seq)`
//!
//! The sequence number makes every result handle unique, even for two
//! identical operations on identical inputs. A discarded handle is therefore
//! never reissued.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::error::FheError;
use super::handle::CiphertextHandle;
use super::EncryptedArithmetic;
use crate::config::{AES_KEY_LENGTH, HANDLE_DERIVATION_CONTEXT};
use crate::crypto::encryption::{self, SealedPayload};
use crate::crypto::hash::{domain_separated_hash_multi, fingerprint};
use crate::identity::Address;

const OP_TRIVIAL: &[u8] = b"trivial";
const OP_ADD: &[u8] = b"add";
const OP_SUB: &[u8] = b"sub";

// ---------------------------------------------------------------------------
// NetworkKey
// ---------------------------------------------------------------------------

/// The symmetric key under which every stored ciphertext is sealed.
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkKey([u8; AES_KEY_LENGTH]);

impl NetworkKey {
    /// A fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; AES_KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded key, tolerating surrounding whitespace (key files
    /// usually end with a newline).
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; AES_KEY_LENGTH];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Non-secret fingerprint for logs and status output.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }

    fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkKey(fp={})", self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// Coprocessor
// ---------------------------------------------------------------------------

/// The reference encrypted-arithmetic executor.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Coprocessor {
    #[serde(skip)]
    network_key: Option<NetworkKey>,
    ciphertexts: BTreeMap<CiphertextHandle, SealedPayload>,
    acl: BTreeMap<CiphertextHandle, BTreeSet<Address>>,
    sequence: u64,
}

impl Coprocessor {
    /// A fresh coprocessor sealing under `key`.
    pub fn new(key: NetworkKey) -> Self {
        Self {
            network_key: Some(key),
            ..Self::default()
        }
    }

    /// A fresh coprocessor with a random network key. Mostly for tests.
    pub fn generate() -> Self {
        Self::new(NetworkKey::generate())
    }

    /// Re-attach the network key after restoring from a snapshot.
    pub fn attach_network_key(&mut self, key: NetworkKey) {
        self.network_key = Some(key);
    }

    pub fn has_network_key(&self) -> bool {
        self.network_key.is_some()
    }

    /// Fingerprint of the attached key, if any.
    pub fn key_fingerprint(&self) -> Option<String> {
        self.network_key.as_ref().map(NetworkKey::fingerprint)
    }

    /// Number of ciphertexts in the store.
    pub fn ciphertext_count(&self) -> usize {
        self.ciphertexts.len()
    }

    /// Addresses allowed to use `handle`.
    pub fn allowed_accounts(&self, handle: &CiphertextHandle) -> Vec<Address> {
        self.acl
            .get(handle)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn key(&self) -> Result<&NetworkKey, FheError> {
        self.network_key.as_ref().ok_or(FheError::MissingNetworkKey)
    }

    /// Decrypt a stored value. Crate-private: plaintexts leave the
    /// coprocessor only through the user-decryption path.
    pub(crate) fn plaintext(&self, handle: &CiphertextHandle) -> Result<u64, FheError> {
        if !handle.is_initialized() {
            return Ok(0);
        }
        let key = self.key()?;
        let sealed = self
            .ciphertexts
            .get(handle)
            .ok_or(FheError::UnknownHandle(*handle))?;
        Ok(encryption::open_u64(key.as_bytes(), sealed, handle.as_bytes())?)
    }

    fn derive_handle(&mut self, op: &[u8], lhs: &CiphertextHandle, rhs: u64) -> CiphertextHandle {
        self.sequence += 1;
        CiphertextHandle::from_bytes(domain_separated_hash_multi(
            HANDLE_DERIVATION_CONTEXT,
            &[
                op,
                lhs.as_bytes(),
                &rhs.to_le_bytes(),
                &self.sequence.to_le_bytes(),
            ],
        ))
    }

    fn store(&mut self, op: &[u8], lhs: &CiphertextHandle, rhs: u64, value: u64) -> Result<CiphertextHandle, FheError> {
        let key = self.key()?.clone();
        let handle = self.derive_handle(op, lhs, rhs);
        let sealed = encryption::seal_u64(key.as_bytes(), value, handle.as_bytes())?;
        self.ciphertexts.insert(handle, sealed);
        debug!(%handle, op = %String::from_utf8_lossy(op), "ciphertext stored");
        Ok(handle)
    }
}

impl EncryptedArithmetic for Coprocessor {
    fn trivial_encrypt(&mut self, value: u64) -> Result<CiphertextHandle, FheError> {
        self.store(OP_TRIVIAL, &CiphertextHandle::UNINITIALIZED, value, value)
    }

    fn add_plain(&mut self, lhs: &CiphertextHandle, rhs: u64) -> Result<CiphertextHandle, FheError> {
        let current = self.plaintext(lhs)?;
        let sum = current.checked_add(rhs).ok_or(FheError::Overflow)?;
        self.store(OP_ADD, lhs, rhs, sum)
    }

    fn sub_plain(&mut self, lhs: &CiphertextHandle, rhs: u64) -> Result<CiphertextHandle, FheError> {
        let current = self.plaintext(lhs)?;
        let diff = current.checked_sub(rhs).ok_or(FheError::Underflow)?;
        self.store(OP_SUB, lhs, rhs, diff)
    }

    fn allow(&mut self, handle: &CiphertextHandle, account: Address) -> Result<(), FheError> {
        if !handle.is_initialized() {
            return Ok(());
        }
        if !self.ciphertexts.contains_key(handle) {
            return Err(FheError::UnknownHandle(*handle));
        }
        self.acl.entry(*handle).or_default().insert(account);
        Ok(())
    }

    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.acl
            .get(handle)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }

    fn discard(&mut self, handle: &CiphertextHandle) {
        if self.ciphertexts.remove(handle).is_some() {
            debug!(%handle, "ciphertext discarded");
        }
        self.acl.remove(handle);
    }
}

impl fmt::Debug for Coprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coprocessor")
            .field("key_fingerprint", &self.key_fingerprint())
            .field("ciphertexts", &self.ciphertexts.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}
