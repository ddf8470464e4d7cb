//! # User Decryption
//!
//! The only path by which a plaintext leaves the coprocessor.
//!
//! ## Protocol Flow
//!
//! 1. The user generates an X25519 [`ViewingKeypair`].
//! 2. They build a [`UserDecryptRequest`] binding the viewing public key,
//!    the contract addresses they want to read through, a start timestamp
//!    and a validity window in days.
//! 3. They sign the request's canonical payload with their Ed25519 account
//!    key, producing a [`SignedDecryptRequest`].
//! 4. The coprocessor verifies the signature and the window, then checks,
//!    for every requested `(handle, contract)` pair, that the contract is in
//!    the signed set and that both the user and the contract are on the
//!    handle's ACL.
//! 5. Each plaintext is sealed to the viewing key and returned as a
//!    [`ReencryptedValue`]. Only the viewing secret opens it.
//!
//! A request is reusable for its whole window. Within that window it is a
//! bearer credential for the listed contracts, so the window is capped at
//! [`MAX_DECRYPT_DURATION_DAYS`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::coprocessor::Coprocessor;
use super::error::FheError;
use super::handle::CiphertextHandle;
use super::EncryptedArithmetic;
use crate::config::{
    MAX_DECRYPT_CONTRACTS, MAX_DECRYPT_DURATION_DAYS, SECONDS_PER_DAY, USER_DECRYPT_DOMAIN,
    VIEWING_KEY_LENGTH,
};
use crate::crypto::keys::{AccountKeypair, AccountPublicKey, AccountSignature};
use crate::crypto::sealed_box::{is_valid_viewing_key, seal_to, SealedBox, SealedBoxError, ViewingKeypair};
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a user-decryption request is refused.
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("invalid request signature")]
    InvalidSignature,

    /// The signing key does not control the claimed user address.
    #[error("signer does not control {claimed}")]
    SignerMismatch { claimed: Address },

    #[error("request not valid before {start}, now {now}")]
    RequestNotYetValid { start: u64, now: u64 },

    #[error("request expired at {expired_at}, now {now}")]
    RequestExpired { expired_at: u64, now: u64 },

    #[error("invalid duration {0} days: must be between 1 and {MAX_DECRYPT_DURATION_DAYS}")]
    InvalidDuration(u32),

    #[error("request must name between 1 and {MAX_DECRYPT_CONTRACTS} contracts, got {0}")]
    InvalidContractCount(usize),

    #[error("invalid viewing key")]
    InvalidViewingKey,

    /// A `(handle, contract)` pair names a contract outside the signed set.
    #[error("contract {0} is not authorized by this request")]
    ContractNotAuthorized(Address),

    /// The handle's ACL does not include `account`.
    #[error("{account} is not allowed to decrypt {handle}")]
    AccessDenied {
        handle: CiphertextHandle,
        account: Address,
    },

    #[error(transparent)]
    Fhe(#[from] FheError),

    #[error("re-encryption failed: {0}")]
    Reencryption(#[from] SealedBoxError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The payload a user signs to authorize decryption of their handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDecryptRequest {
    /// X25519 public key the results are sealed to.
    pub viewing_key: [u8; VIEWING_KEY_LENGTH],
    /// Contracts through which handles may be read.
    pub contract_addresses: Vec<Address>,
    /// Unix seconds from which the request is valid.
    pub start_timestamp: u64,
    /// Length of the validity window.
    pub duration_days: u32,
}

impl UserDecryptRequest {
    /// Canonical bytes covered by the signature.
    ///
    /// `domain || viewing_key || start (8B LE) || days (4B LE) || n (4B LE) || addr_1..addr_n`
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            USER_DECRYPT_DOMAIN.len() + VIEWING_KEY_LENGTH + 16 + self.contract_addresses.len() * 20,
        );
        out.extend_from_slice(USER_DECRYPT_DOMAIN.as_bytes());
        out.extend_from_slice(&self.viewing_key);
        out.extend_from_slice(&self.start_timestamp.to_le_bytes());
        out.extend_from_slice(&self.duration_days.to_le_bytes());
        out.extend_from_slice(&(self.contract_addresses.len() as u32).to_le_bytes());
        for addr in &self.contract_addresses {
            out.extend_from_slice(addr.as_bytes());
        }
        out
    }

    /// First second at which the request is no longer valid.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(u64::from(self.duration_days) * SECONDS_PER_DAY)
    }
}

/// A request together with the user's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDecryptRequest {
    pub request: UserDecryptRequest,
    /// Address the requester claims to be.
    pub user: Address,
    /// Ed25519 key that signed the request; must derive `user`.
    pub signer: AccountPublicKey,
    pub signature: AccountSignature,
}

impl SignedDecryptRequest {
    /// Sign `request` with `account`.
    pub fn sign(request: UserDecryptRequest, account: &AccountKeypair) -> Self {
        let signature = account.sign(&request.signing_payload());
        let signer = account.public_key();
        Self {
            user: Address::from_public_key(&signer),
            request,
            signer,
            signature,
        }
    }

    /// Stateless checks: signature, signer binding, window shape and
    /// freshness at `now`.
    pub fn verify(&self, now: u64) -> Result<(), DecryptionError> {
        if Address::from_public_key(&self.signer) != self.user {
            return Err(DecryptionError::SignerMismatch { claimed: self.user });
        }
        if !self
            .signer
            .verify(&self.request.signing_payload(), &self.signature)
        {
            return Err(DecryptionError::InvalidSignature);
        }

        let req = &self.request;
        if req.duration_days == 0 || req.duration_days > MAX_DECRYPT_DURATION_DAYS {
            return Err(DecryptionError::InvalidDuration(req.duration_days));
        }
        let n = req.contract_addresses.len();
        if n == 0 || n > MAX_DECRYPT_CONTRACTS {
            return Err(DecryptionError::InvalidContractCount(n));
        }
        if now < req.start_timestamp {
            return Err(DecryptionError::RequestNotYetValid {
                start: req.start_timestamp,
                now,
            });
        }
        if now >= req.expires_at() {
            return Err(DecryptionError::RequestExpired {
                expired_at: req.expires_at(),
                now,
            });
        }
        if !is_valid_viewing_key(&req.viewing_key) {
            return Err(DecryptionError::InvalidViewingKey);
        }
        Ok(())
    }
}

/// One `(handle, contract)` pair to decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract: Address,
}

/// A plaintext sealed to the requester's viewing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReencryptedValue {
    pub handle: CiphertextHandle,
    pub sealed: SealedBox,
}

// ---------------------------------------------------------------------------
// Coprocessor side
// ---------------------------------------------------------------------------

impl Coprocessor {
    /// Serve a user-decryption request at time `now`.
    ///
    /// All pairs are checked before anything is re-encrypted; a single bad
    /// pair fails the whole request.
    pub fn user_decrypt(
        &self,
        signed: &SignedDecryptRequest,
        pairs: &[HandleContractPair],
        now: u64,
    ) -> Result<Vec<ReencryptedValue>, DecryptionError> {
        signed.verify(now)?;
        let user = signed.user;

        for pair in pairs {
            if !signed.request.contract_addresses.contains(&pair.contract) {
                return Err(DecryptionError::ContractNotAuthorized(pair.contract));
            }
            if !pair.handle.is_initialized() {
                continue;
            }
            for account in [user, pair.contract] {
                if !self.is_allowed(&pair.handle, &account) {
                    return Err(DecryptionError::AccessDenied {
                        handle: pair.handle,
                        account,
                    });
                }
            }
        }

        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let value = self.plaintext(&pair.handle)?;
            let sealed = seal_to(
                &signed.request.viewing_key,
                &value.to_le_bytes(),
                pair.handle.as_bytes(),
            )?;
            out.push(ReencryptedValue {
                handle: pair.handle,
                sealed,
            });
        }

        tracing::debug!(%user, count = out.len(), "user decryption served");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Everything a client keeps between decryption calls: the viewing secret
/// and the signed request that authorizes it.
#[derive(Debug)]
pub struct DecryptionSession {
    viewing: ViewingKeypair,
    signed: SignedDecryptRequest,
}

impl DecryptionSession {
    /// Generate a viewing key and sign a request for `contracts`.
    pub fn new(
        account: &AccountKeypair,
        contracts: Vec<Address>,
        start_timestamp: u64,
        duration_days: u32,
    ) -> Self {
        let viewing = ViewingKeypair::generate();
        let request = UserDecryptRequest {
            viewing_key: viewing.public_key_bytes(),
            contract_addresses: contracts,
            start_timestamp,
            duration_days,
        };
        Self {
            signed: SignedDecryptRequest::sign(request, account),
            viewing,
        }
    }

    pub fn signed_request(&self) -> &SignedDecryptRequest {
        &self.signed
    }

    /// Open a value returned by the coprocessor.
    pub fn open(&self, value: &ReencryptedValue) -> Result<u64, DecryptionError> {
        Ok(self.viewing.open_u64(&value.sealed, value.handle.as_bytes())?)
    }

    /// Request and open a single handle in one step.
    pub fn decrypt(
        &self,
        coprocessor: &Coprocessor,
        handle: CiphertextHandle,
        contract: Address,
        now: u64,
    ) -> Result<u64, DecryptionError> {
        let values =
            coprocessor.user_decrypt(&self.signed, &[HandleContractPair { handle, contract }], now)?;
        match values.first() {
            Some(value) => self.open(value),
            None => Err(FheError::UnknownHandle(handle).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn token() -> Address {
        Address::derive_contract("confidential-token")
    }

    /// A coprocessor holding one value of 500 readable by `user` via `token()`.
    fn setup(user: Address) -> (Coprocessor, CiphertextHandle) {
        let mut cp = Coprocessor::generate();
        let h = cp.trivial_encrypt(500).unwrap();
        cp.allow(&h, user).unwrap();
        cp.allow(&h, token()).unwrap();
        (cp, h)
    }

    #[test]
    fn authorized_user_decrypts_own_handle() {
        let account = AccountKeypair::generate();
        let user = Address::from_public_key(&account.public_key());
        let (cp, h) = setup(user);

        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);
        assert_eq!(session.decrypt(&cp, h, token(), NOW + 60).unwrap(), 500);
    }

    #[test]
    fn other_user_is_denied() {
        let owner = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&owner.public_key()));

        let snoop = AccountKeypair::generate();
        let session = DecryptionSession::new(&snoop, vec![token()], NOW, 7);
        assert!(matches!(
            session.decrypt(&cp, h, token(), NOW),
            Err(DecryptionError::AccessDenied { .. })
        ));
    }

    #[test]
    fn contract_outside_signed_set_is_rejected() {
        let account = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&account.public_key()));

        let other = Address::derive_contract("somewhere-else");
        let session = DecryptionSession::new(&account, vec![other], NOW, 7);
        assert!(matches!(
            session.decrypt(&cp, h, token(), NOW),
            Err(DecryptionError::ContractNotAuthorized(_))
        ));
    }

    #[test]
    fn contract_must_be_on_acl_too() {
        let account = AccountKeypair::generate();
        let user = Address::from_public_key(&account.public_key());
        let mut cp = Coprocessor::generate();
        let h = cp.trivial_encrypt(1).unwrap();
        cp.allow(&h, user).unwrap();

        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);
        assert!(matches!(
            session.decrypt(&cp, h, token(), NOW),
            Err(DecryptionError::AccessDenied { account, .. }) if account == token()
        ));
    }

    #[test]
    fn window_is_enforced() {
        let account = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&account.public_key()));
        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);

        assert!(matches!(
            session.decrypt(&cp, h, token(), NOW - 1),
            Err(DecryptionError::RequestNotYetValid { .. })
        ));
        assert!(matches!(
            session.decrypt(&cp, h, token(), NOW + 7 * SECONDS_PER_DAY),
            Err(DecryptionError::RequestExpired { .. })
        ));
        assert!(session
            .decrypt(&cp, h, token(), NOW + 7 * SECONDS_PER_DAY - 1)
            .is_ok());
    }

    #[test]
    fn tampered_request_fails_signature() {
        let account = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&account.public_key()));
        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);

        let mut forged = session.signed_request().clone();
        forged.request.duration_days = 365;
        let pair = HandleContractPair {
            handle: h,
            contract: token(),
        };
        assert!(matches!(
            cp.user_decrypt(&forged, &[pair], NOW),
            Err(DecryptionError::InvalidSignature)
        ));
    }

    #[test]
    fn claimed_user_must_match_signer() {
        let account = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&account.public_key()));
        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);

        let mut forged = session.signed_request().clone();
        forged.user = Address::from_bytes([0xEE; 20]);
        let pair = HandleContractPair {
            handle: h,
            contract: token(),
        };
        assert!(matches!(
            cp.user_decrypt(&forged, &[pair], NOW),
            Err(DecryptionError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn duration_bounds_are_checked() {
        let account = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&account.public_key()));

        for days in [0, MAX_DECRYPT_DURATION_DAYS + 1] {
            let session = DecryptionSession::new(&account, vec![token()], NOW, days);
            assert!(matches!(
                session.decrypt(&cp, h, token(), NOW),
                Err(DecryptionError::InvalidDuration(d)) if d == days
            ));
        }
    }

    #[test]
    fn uninitialized_handle_reads_as_zero() {
        let account = AccountKeypair::generate();
        let cp = Coprocessor::generate();
        let session = DecryptionSession::new(&account, vec![token()], NOW, 1);
        assert_eq!(
            session
                .decrypt(&cp, CiphertextHandle::UNINITIALIZED, token(), NOW)
                .unwrap(),
            0
        );
    }

    #[test]
    fn reencrypted_value_is_opaque_to_other_sessions() {
        let account = AccountKeypair::generate();
        let (cp, h) = setup(Address::from_public_key(&account.public_key()));
        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);
        let second = DecryptionSession::new(&account, vec![token()], NOW, 7);

        let values = cp
            .user_decrypt(
                session.signed_request(),
                &[HandleContractPair {
                    handle: h,
                    contract: token(),
                }],
                NOW,
            )
            .unwrap();
        assert_eq!(session.open(&values[0]).unwrap(), 500);
        assert!(second.open(&values[0]).is_err());
    }

    #[test]
    fn signed_request_json_roundtrip() {
        let account = AccountKeypair::generate();
        let session = DecryptionSession::new(&account, vec![token()], NOW, 7);
        let json = serde_json::to_string(session.signed_request()).unwrap();
        let back: SignedDecryptRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, session.signed_request());
        assert!(back.verify(NOW).is_ok());
    }
}
