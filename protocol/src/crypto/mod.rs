//! # Cryptographic Primitives for TermVault
//!
//! Every secret in the system flows through here: sealed balances, account
//! signatures, viewing-key boxes, handle derivation.
//!
//! - **Ed25519** for account signatures.
//! - **X25519** for viewing keys and sealed boxes.
//! - **AES-256-GCM** for every sealed payload.
//! - **BLAKE3** for hashing and key derivation.
//! - **SHA-256** for operator-facing fingerprints.
//!
//! Everything here is a thin, typed wrapper around audited implementations.
//! If you're tempted to optimize these functions, please reconsider.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod sealed_box;

pub use encryption::{open, seal, SealedPayload};
pub use hash::{blake3_hash, domain_separated_hash, fingerprint, sha256};
pub use keys::{AccountKeypair, AccountPublicKey, AccountSignature};
pub use sealed_box::{seal_to, SealedBox, ViewingKeypair};
