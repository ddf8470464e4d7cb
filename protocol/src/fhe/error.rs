//! Errors raised by the encrypted-arithmetic executor.

use thiserror::Error;

use super::handle::CiphertextHandle;
use crate::crypto::encryption::EncryptionError;

/// Errors from homomorphic operations and the ciphertext store.
#[derive(Debug, Error)]
pub enum FheError {
    /// `sub_plain` would take the encrypted value below zero. This is the
    /// guard the ledger relies on for insufficient-balance checks.
    #[error("encrypted subtraction underflow")]
    Underflow,

    /// `add_plain` would exceed `u64::MAX`.
    #[error("encrypted addition overflow")]
    Overflow,

    /// The handle does not refer to a stored ciphertext.
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(CiphertextHandle),

    /// The executor was restored from a snapshot but the network key has not
    /// been attached yet.
    #[error("network key not loaded")]
    MissingNetworkKey,

    /// Sealing or opening a stored ciphertext failed.
    #[error("ciphertext sealing failed: {0}")]
    Sealing(#[from] EncryptionError),
}
