//! # Confidential Token Ledger
//!
//! An encrypted-balance token (`MockUSDT`, 6 decimals). Every balance is a
//! [`CiphertextHandle`]; the ledger never sees a plaintext balance. It does
//! see the plaintext *amounts* callers submit, and combines them with the
//! stored handles through its [`EncryptedArithmetic`] executor.
//!
//! ## Operators
//!
//! An owner grants an operator the right to pull funds from their balance
//! until a given timestamp: `(owner, operator) → until`. A grant is live iff
//! `now < until`. Grants are overwritten, never extended, and never created
//! implicitly.
//!
//! ## Moving funds
//!
//! | Call     | Authorized caller          | Moves `amount` from → to |
//! |----------|----------------------------|--------------------------|
//! | `mint`   | anyone (open faucet)       | nowhere → `account`      |
//! | `debit`  | `owner` or a live operator | `owner` → caller         |
//! | `credit` | anyone                     | caller → `recipient`     |
//!
//! Both sides of a move are computed before either is stored, so an
//! underflow on the source leaves every balance untouched. The executor's
//! underflow guard is the only insufficient-balance check there is.
//!
//! ## Access control
//!
//! Each handle the ledger stores is allowed on the executor's ACL to the
//! account it belongs to, to the ledger's own address and, when configured,
//! to an auditor. Transfer-amount handles are allowed to both parties.
//!
//! ## Atomic sections
//!
//! [`ConfidentialToken::atomically`] runs a closure under an undo journal.
//! If the closure fails, every balance, operator grant, the supply handle
//! and the event queue go back to where they were.
//!
//! ## Ciphertext lifetime
//!
//! A balance or supply handle is discarded from the executor as soon as it
//! is replaced for good: immediately outside an atomic section, when the
//! outermost section succeeds otherwise. Handles created by a section that
//! rolls back are discarded by the rollback. Transfer-amount handles stay
//! decryptable for the last `amount_retention` moves only, so the store is
//! bounded by the number of accounts plus that window.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info};

use termvault_protocol::config::{
    AMOUNT_HANDLE_RETENTION, TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL,
};
use termvault_protocol::fhe::{CiphertextHandle, Coprocessor, EncryptedArithmetic, FheError};
use termvault_protocol::identity::Address;

use crate::context::CallContext;
use crate::events::EventLog;

/// Deployment label the ledger's contract address is derived from.
pub const TOKEN_CONTRACT_LABEL: &str = "confidential-token";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Zero amounts are rejected on every moving call.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// An operator grant must expire in the future.
    #[error("operator expiry {until} is not after now ({now})")]
    InvalidExpiry { until: u64, now: u64 },

    /// `operator` has no live grant from `owner`.
    #[error("{operator} is not an operator for {owner}")]
    NotAuthorized { owner: Address, operator: Address },

    /// The executor refused the subtraction on `account`'s balance.
    #[error("insufficient balance for {account}")]
    InsufficientBalance { account: Address },

    /// A balance or the total supply would exceed `u64::MAX`.
    #[error("amount overflow")]
    AmountOverflow,

    #[error("encrypted arithmetic failed: {0}")]
    Fhe(FheError),
}

impl LedgerError {
    /// Translate an executor error raised while touching `account`.
    fn from_fhe(err: FheError, account: Address) -> Self {
        match err {
            FheError::Underflow => LedgerError::InsufficientBalance { account },
            FheError::Overflow => LedgerError::AmountOverflow,
            other => LedgerError::Fhe(other),
        }
    }
}

impl From<FheError> for LedgerError {
    fn from(err: FheError) -> Self {
        match err {
            FheError::Overflow => LedgerError::AmountOverflow,
            other => LedgerError::Fhe(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the ledger. Amounts are always ciphertext handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Newly issued supply credited to `to`.
    Minted {
        to: Address,
        amount: CiphertextHandle,
    },
    /// `holder` granted `operator` pull rights until `until`.
    OperatorSet {
        holder: Address,
        operator: Address,
        until: u64,
    },
    /// Funds moved between two accounts.
    ConfidentialTransfer {
        from: Address,
        to: Address,
        amount: CiphertextHandle,
    },
}

// ---------------------------------------------------------------------------
// Ledger interface
// ---------------------------------------------------------------------------

/// The calls a contract built on top of the ledger is allowed to make.
///
/// The deposit bank is written against this trait and never sees balances,
/// grants or the executor directly.
pub trait ConfidentialLedger {
    /// The ledger's own contract address.
    fn address(&self) -> Address;

    /// Whether `operator` holds a live grant from `owner` at `now`.
    fn is_operator(&self, owner: &Address, operator: &Address, now: u64) -> bool;

    /// Issue `amount` new tokens to `account`.
    fn mint(
        &mut self,
        ctx: &CallContext,
        account: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError>;

    /// Pull `amount` from `owner` into the caller's balance.
    fn debit(
        &mut self,
        ctx: &CallContext,
        owner: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError>;

    /// Push `amount` from the caller's balance to `recipient`.
    fn credit(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError>;

    /// Run `f` so that either all of its ledger effects land or none do.
    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>;
}

// ---------------------------------------------------------------------------
// Undo journal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Undo {
    Balance(Address, Option<CiphertextHandle>),
    Operator(Address, Address, Option<u64>),
    Supply(CiphertextHandle),
    Amount(CiphertextHandle),
}

// ---------------------------------------------------------------------------
// ConfidentialToken
// ---------------------------------------------------------------------------

/// The encrypted-balance ledger.
///
/// Owns its executor so that every handle it stores is guaranteed to exist
/// in the same ciphertext store. The whole struct (minus pending events) is
/// serializable for snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidentialToken<X = Coprocessor> {
    address: Address,
    auditor: Option<Address>,
    balances: BTreeMap<Address, CiphertextHandle>,
    /// owner → (operator → until)
    operators: BTreeMap<Address, BTreeMap<Address, u64>>,
    total_supply: CiphertextHandle,
    /// Transfer-amount handles still decryptable, oldest first.
    amounts: VecDeque<CiphertextHandle>,
    amount_retention: usize,
    executor: X,
    #[serde(skip)]
    events: EventLog<LedgerEvent>,
    #[serde(skip)]
    journal: Option<Vec<Undo>>,
}

impl<X: EncryptedArithmetic> ConfidentialToken<X> {
    /// A ledger at the standard token address with no auditor.
    pub fn new(executor: X) -> Self {
        Self {
            address: Address::derive_contract(TOKEN_CONTRACT_LABEL),
            auditor: None,
            balances: BTreeMap::new(),
            operators: BTreeMap::new(),
            total_supply: CiphertextHandle::UNINITIALIZED,
            amounts: VecDeque::new(),
            amount_retention: AMOUNT_HANDLE_RETENTION,
            executor,
            events: EventLog::new(),
            journal: None,
        }
    }

    /// Also allow every handle this ledger creates to `auditor`.
    pub fn with_auditor(mut self, auditor: Address) -> Self {
        self.auditor = Some(auditor);
        self
    }

    /// Keep only the last `retention` transfer-amount handles.
    pub fn with_amount_retention(mut self, retention: usize) -> Self {
        self.amount_retention = retention;
        self
    }

    // -- Metadata -----------------------------------------------------------

    /// The ledger's contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &'static str {
        TOKEN_NAME
    }

    pub fn symbol(&self) -> &'static str {
        TOKEN_SYMBOL
    }

    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    pub fn auditor(&self) -> Option<Address> {
        self.auditor
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }

    /// Mutable access for hosts that need to re-attach keys after a restore.
    pub fn executor_mut(&mut self) -> &mut X {
        &mut self.executor
    }

    // -- Queries ------------------------------------------------------------

    /// Handle of `account`'s balance. Untouched accounts return
    /// [`CiphertextHandle::UNINITIALIZED`], which decrypts to zero.
    pub fn balance_handle(&self, account: &Address) -> CiphertextHandle {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Handle of the running total supply.
    pub fn total_supply_handle(&self) -> CiphertextHandle {
        self.total_supply
    }

    /// The stored expiry for `(owner, operator)`, live or not.
    pub fn operator_expiry(&self, owner: &Address, operator: &Address) -> Option<u64> {
        self.operators
            .get(owner)
            .and_then(|grants| grants.get(operator))
            .copied()
    }

    /// Transfer-amount handles that can still be decrypted, oldest first.
    pub fn retained_amounts(&self) -> impl Iterator<Item = &CiphertextHandle> {
        self.amounts.iter()
    }

    /// Number of accounts that have ever held a balance.
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }

    /// Accounts that have ever held a balance, in address order.
    pub fn accounts(&self) -> impl Iterator<Item = &Address> {
        self.balances.keys()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        self.events.drain()
    }

    // -- Operators ----------------------------------------------------------

    /// Grant `operator` pull rights over the caller's balance until `until`,
    /// replacing any previous grant for the pair.
    pub fn set_operator(
        &mut self,
        ctx: &CallContext,
        operator: Address,
        until: u64,
    ) -> Result<(), LedgerError> {
        if until <= ctx.timestamp {
            return Err(LedgerError::InvalidExpiry {
                until,
                now: ctx.timestamp,
            });
        }

        let holder = ctx.caller;
        let previous = self
            .operators
            .entry(holder)
            .or_default()
            .insert(operator, until);
        self.record(Undo::Operator(holder, operator, previous));

        info!(%holder, %operator, until, "operator set");
        self.events.emit(LedgerEvent::OperatorSet {
            holder,
            operator,
            until,
        });
        Ok(())
    }

    // -- Moving funds -------------------------------------------------------

    fn ensure_nonzero(amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            Err(LedgerError::InvalidAmount)
        } else {
            Ok(())
        }
    }

    /// Allow `handle` to `accounts`, the ledger itself and the auditor.
    fn grant(&mut self, handle: &CiphertextHandle, accounts: &[Address]) -> Result<(), LedgerError> {
        for account in accounts {
            self.executor.allow(handle, *account)?;
        }
        self.executor.allow(handle, self.address)?;
        if let Some(auditor) = self.auditor {
            self.executor.allow(handle, auditor)?;
        }
        Ok(())
    }

    fn store_balance(&mut self, account: Address, handle: CiphertextHandle) {
        let previous = self.balances.insert(account, handle);
        if self.journal.is_some() {
            self.record(Undo::Balance(account, previous));
        } else if let Some(previous) = previous {
            self.executor.discard(&previous);
        }
    }

    fn store_supply(&mut self, handle: CiphertextHandle) {
        let previous = std::mem::replace(&mut self.total_supply, handle);
        if self.journal.is_some() {
            self.record(Undo::Supply(previous));
        } else {
            self.executor.discard(&previous);
        }
    }

    fn store_amount(&mut self, handle: CiphertextHandle) {
        self.amounts.push_back(handle);
        if self.journal.is_some() {
            self.record(Undo::Amount(handle));
        } else {
            self.trim_amounts();
        }
    }

    fn trim_amounts(&mut self) {
        while self.amounts.len() > self.amount_retention {
            if let Some(oldest) = self.amounts.pop_front() {
                self.executor.discard(&oldest);
            }
        }
    }

    /// Move `amount` from `from` to `to`. Nothing is stored unless every
    /// executor call succeeds.
    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        let from_old = self.balance_handle(&from);
        let from_new = self
            .executor
            .sub_plain(&from_old, amount)
            .map_err(|e| LedgerError::from_fhe(e, from))?;

        let to_old = if from == to {
            from_new
        } else {
            self.balance_handle(&to)
        };
        let to_new = match self.executor.add_plain(&to_old, amount) {
            Ok(handle) => handle,
            Err(e) => {
                self.executor.discard(&from_new);
                return Err(LedgerError::from_fhe(e, to));
            }
        };
        let amount_handle = self.executor.trivial_encrypt(amount)?;

        self.grant(&from_new, &[from])?;
        self.grant(&to_new, &[to])?;
        self.grant(&amount_handle, &[from, to])?;

        self.store_balance(from, from_new);
        self.store_balance(to, to_new);
        self.store_amount(amount_handle);

        debug!(%from, %to, amount = %amount_handle, "confidential transfer");
        self.events.emit(LedgerEvent::ConfidentialTransfer {
            from,
            to,
            amount: amount_handle,
        });
        Ok(amount_handle)
    }

    /// Issue `amount` to `account` and grow the supply by the same amount.
    pub fn mint(
        &mut self,
        ctx: &CallContext,
        account: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        Self::ensure_nonzero(amount)?;

        let supply_old = self.total_supply;
        let balance_old = self.balance_handle(&account);
        let supply = self.executor.add_plain(&supply_old, amount)?;
        let balance = match self.executor.add_plain(&balance_old, amount) {
            Ok(handle) => handle,
            Err(e) => {
                self.executor.discard(&supply);
                return Err(LedgerError::from_fhe(e, account));
            }
        };
        let amount_handle = self.executor.trivial_encrypt(amount)?;

        self.grant(&supply, &[])?;
        self.grant(&balance, &[account])?;
        self.grant(&amount_handle, &[account])?;

        self.store_supply(supply);
        self.store_balance(account, balance);
        self.store_amount(amount_handle);

        info!(caller = %ctx.caller, to = %account, amount = %amount_handle, "minted");
        self.events.emit(LedgerEvent::Minted {
            to: account,
            amount: amount_handle,
        });
        Ok(balance)
    }

    /// Pull `amount` from `owner` into the caller's balance. The caller must
    /// be `owner` or hold a live operator grant from `owner`.
    pub fn debit(
        &mut self,
        ctx: &CallContext,
        owner: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        Self::ensure_nonzero(amount)?;
        if ctx.caller != owner && !self.is_operator(&owner, &ctx.caller, ctx.timestamp) {
            return Err(LedgerError::NotAuthorized {
                owner,
                operator: ctx.caller,
            });
        }
        self.move_balance(owner, ctx.caller, amount)
    }

    /// Push `amount` from the caller's balance to `recipient`.
    pub fn credit(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        Self::ensure_nonzero(amount)?;
        self.move_balance(ctx.caller, recipient, amount)
    }

    pub fn is_operator(&self, owner: &Address, operator: &Address, now: u64) -> bool {
        self.operator_expiry(owner, operator)
            .map(|until| now < until)
            .unwrap_or(false)
    }

    // -- Atomic sections ----------------------------------------------------

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    /// Run `f` under the undo journal. Nested sections roll back only their
    /// own effects.
    pub fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let outermost = self.journal.is_none();
        let mark = self.journal.get_or_insert_with(Vec::new).len();
        let events_mark = self.events.len();

        let result = f(self);
        if result.is_err() {
            self.rollback_to(mark);
            self.events.truncate(events_mark);
            debug!(undone_from = mark, "atomic section rolled back");
        }
        if outermost {
            if let Some(journal) = self.journal.take() {
                self.release_superseded(journal);
            }
            self.trim_amounts();
        }
        result
    }

    /// Discard the handles a committed section replaced.
    fn release_superseded(&mut self, journal: Vec<Undo>) {
        for entry in journal {
            match entry {
                Undo::Balance(_, Some(handle)) | Undo::Supply(handle) => {
                    self.executor.discard(&handle);
                }
                Undo::Balance(_, None) | Undo::Operator(..) | Undo::Amount(_) => {}
            }
        }
    }

    fn rollback_to(&mut self, mark: usize) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        let undo: Vec<Undo> = journal.drain(mark..).rev().collect();
        for entry in undo {
            match entry {
                Undo::Balance(account, previous) => {
                    let current = match previous {
                        Some(handle) => self.balances.insert(account, handle),
                        None => self.balances.remove(&account),
                    };
                    if let Some(current) = current {
                        self.executor.discard(&current);
                    }
                }
                Undo::Operator(owner, operator, previous) => {
                    let grants = self.operators.entry(owner).or_default();
                    match previous {
                        Some(until) => {
                            grants.insert(operator, until);
                        }
                        None => {
                            grants.remove(&operator);
                        }
                    }
                    if grants.is_empty() {
                        self.operators.remove(&owner);
                    }
                }
                Undo::Supply(handle) => {
                    let current = std::mem::replace(&mut self.total_supply, handle);
                    self.executor.discard(&current);
                }
                Undo::Amount(handle) => {
                    if self.amounts.back() == Some(&handle) {
                        self.amounts.pop_back();
                    } else {
                        self.amounts.retain(|h| *h != handle);
                    }
                    self.executor.discard(&handle);
                }
            }
        }
    }
}

impl<X: EncryptedArithmetic> ConfidentialLedger for ConfidentialToken<X> {
    fn address(&self) -> Address {
        self.address
    }

    fn is_operator(&self, owner: &Address, operator: &Address, now: u64) -> bool {
        ConfidentialToken::is_operator(self, owner, operator, now)
    }

    fn mint(
        &mut self,
        ctx: &CallContext,
        account: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        ConfidentialToken::mint(self, ctx, account, amount)
    }

    fn debit(
        &mut self,
        ctx: &CallContext,
        owner: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        ConfidentialToken::debit(self, ctx, owner, amount)
    }

    fn credit(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        amount: u64,
    ) -> Result<CiphertextHandle, LedgerError> {
        ConfidentialToken::credit(self, ctx, recipient, amount)
    }

    fn atomically<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        ConfidentialToken::atomically(self, f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
