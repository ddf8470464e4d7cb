//! # TermVault Contracts
//!
//! The accounting core of TermVault. Two contracts, composed bottom-up:
//!
//! - **Confidential Token**: an encrypted-balance ledger with time-bound
//!   operator grants. Balances are ciphertext handles; only amounts
//!   submitted by callers are ever plaintext.
//! - **Fixed-Term Bank**: locks principal for 1, 6, 12 or 36 months and
//!   pays simple interest at maturity, moving funds only through the
//!   ledger's debit/credit contract.
//!
//! ## Design Principles
//!
//! 1. Every call either commits everything or changes nothing. The ledger
//!    computes all new handles before storing any; the bank settles inside
//!    a ledger atomic section.
//! 2. Time comes in through [`CallContext`], read once per call.
//! 3. Contracts queue events; the host drains them after a successful call.
//! 4. Every state type is serializable (serde) for snapshots.

pub mod confidential_token;
pub mod context;
pub mod events;
pub mod fixed_term_bank;

pub use confidential_token::{ConfidentialLedger, ConfidentialToken, LedgerError, LedgerEvent};
pub use context::CallContext;
pub use events::EventLog;
pub use fixed_term_bank::{
    BankError, BankEvent, DepositId, DepositRecord, DepositView, FixedTermBank, Term,
};
