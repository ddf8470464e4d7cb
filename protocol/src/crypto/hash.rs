//! # Hashing Utilities
//!
//! BLAKE3 is the default for anything TermVault-native: addresses, handle
//! derivation, request digests. SHA-256 exists only for fingerprints that
//! operators compare against output from standard tooling (`sha256sum`).

use sha2::{Digest, Sha256};

/// BLAKE3 hash of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// SHA-256 of `data` as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Domain-separated hash using BLAKE3's `derive_key` mode.
///
/// The same `data` hashed under two different contexts never collides,
/// because the context string selects a different internal IV. Use one of
/// the `*_CONTEXT` constants from [`crate::config`] as the context.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    domain_separated_hash_multi(context, &[data])
}

/// [`domain_separated_hash`] over several parts fed in order, without
/// concatenating them into a temporary buffer first.
///
/// Callers are responsible for making the encoding unambiguous (fixed-width
/// parts or explicit length prefixes).
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Short hex fingerprint of a secret, safe to print in logs and status output.
///
/// First 8 bytes of SHA-256, hex-encoded.
pub fn fingerprint(secret: &[u8]) -> String {
    hex::encode(&sha256(secret)[..8])
}
