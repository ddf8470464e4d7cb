//! # Encrypted Arithmetic
//!
//! The ledger never holds a plaintext balance. It holds
//! [`CiphertextHandle`]s and asks an [`EncryptedArithmetic`] executor to
//! combine them with plaintext operands (the amounts callers submit). The
//! executor is the one party that can tell whether a subtraction would go
//! below zero, and it reports that as [`FheError::Underflow`] without
//! revealing anything else.
//!
//! - [`handle`]: opaque 32-byte references.
//! - [`coprocessor`]: the reference executor (AES-GCM sealed store + ACL).
//! - [`decryption`]: the signed, time-boxed user-decryption protocol.

pub mod coprocessor;
pub mod decryption;
pub mod error;
pub mod handle;

pub use coprocessor::{Coprocessor, NetworkKey};
pub use decryption::{
    DecryptionError, DecryptionSession, HandleContractPair, ReencryptedValue,
    SignedDecryptRequest, UserDecryptRequest,
};
pub use error::FheError;
pub use handle::CiphertextHandle;

use crate::identity::Address;

/// Homomorphic operations over encrypted `u64` values with plaintext
/// operands, plus the access-control list that decides who may use a
/// handle.
///
/// Every arithmetic call returns a *new* handle and leaves its input intact.
/// Callers decide when to swap their stored handle for the new one, which is
/// what makes rollback a matter of restoring the old handle. Once a handle is
/// superseded for good, callers [`discard`](EncryptedArithmetic::discard) it.
pub trait EncryptedArithmetic {
    /// Encrypt a public constant.
    fn trivial_encrypt(&mut self, value: u64) -> Result<CiphertextHandle, FheError>;

    /// `lhs + rhs`, failing with [`FheError::Overflow`] past `u64::MAX`.
    fn add_plain(&mut self, lhs: &CiphertextHandle, rhs: u64) -> Result<CiphertextHandle, FheError>;

    /// `lhs - rhs`, failing with [`FheError::Underflow`] below zero.
    fn sub_plain(&mut self, lhs: &CiphertextHandle, rhs: u64) -> Result<CiphertextHandle, FheError>;

    /// Grant `account` the right to use and decrypt `handle`.
    fn allow(&mut self, handle: &CiphertextHandle, account: Address) -> Result<(), FheError>;

    /// Whether `account` is on `handle`'s ACL.
    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool;

    /// Forget `handle`: its ciphertext and its ACL entry. Unknown and
    /// uninitialized handles are ignored.
    fn discard(&mut self, handle: &CiphertextHandle);
}
