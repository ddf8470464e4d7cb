//! # Fixed-Term Deposit Bank
//!
//! Lock confidential tokens for a fixed term, collect simple interest at
//! maturity. The lifecycle of a deposit is:
//!
//! 1. **Grant**: the depositor makes the bank an operator on the ledger
//!    (the bank never grants itself anything).
//! 2. **Deposit**: the bank pulls the principal into its own holding and
//!    records `(owner, principal, term, start)`.
//! 3. **Mature**: `start + months * 30 days` passes.
//! 4. **Withdraw**: the owner gets `principal + interest` pushed back to
//!    their balance, and the record is marked withdrawn. For good.
//!
//! There is no cancellation and no early exit.
//!
//! ## Term schedule
//!
//! | Code | Term         | Months | Interest on 1000 |
//! |------|--------------|--------|------------------|
//! | 0    | One month    | 1      | 10               |
//! | 1    | Six months   | 6      | 60               |
//! | 2    | One year     | 12     | 120              |
//! | 3    | Three years  | 36     | 360              |
//!
//! `interest = floor(principal * months / 100)`, so the month count doubles
//! as the percentage rate.
//!
//! ## Where the interest comes from
//!
//! The bank issues the interest through the ledger's open faucet into its
//! own holding, then pushes principal + interest to the owner. Both steps
//! run inside one ledger atomic section. Net effect: the bank's holding
//! drops by exactly the principal and the supply grows by exactly the
//! interest, so the bank always holds the sum of open principals.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use termvault_protocol::config::SECONDS_PER_MONTH;
use termvault_protocol::identity::Address;

use crate::confidential_token::{ConfidentialLedger, LedgerError};
use crate::context::CallContext;
use crate::events::EventLog;

/// Deployment label the bank's contract address is derived from.
pub const BANK_CONTRACT_LABEL: &str = "fixed-term-bank";

/// Identifier of a deposit record. Starts at 1.
pub type DepositId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during bank operations.
#[derive(Debug, Error)]
pub enum BankError {
    /// Principal must be greater than zero.
    #[error("principal must be greater than zero")]
    InvalidAmount,

    /// Term code outside the schedule.
    #[error("invalid term code {0}")]
    InvalidTerm(u8),

    /// The caller lacks the right to do this: no live operator grant on
    /// deposit, not the owner on withdraw.
    #[error("not authorized")]
    NotAuthorized,

    /// The depositor's balance does not cover the principal.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Withdraw attempted before maturity.
    #[error("deposit {deposit_id} is locked until {maturity} (now {now})")]
    DepositLocked {
        deposit_id: DepositId,
        maturity: u64,
        now: u64,
    },

    #[error("deposit {0} already withdrawn")]
    AlreadyWithdrawn(DepositId),

    #[error("deposit {0} not found")]
    NotFound(DepositId),

    /// `principal + interest` does not fit in a `u64`.
    #[error("amount overflow")]
    AmountOverflow,

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for BankError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount => BankError::InvalidAmount,
            LedgerError::NotAuthorized { .. } => BankError::NotAuthorized,
            LedgerError::InsufficientBalance { .. } => BankError::InsufficientBalance,
            LedgerError::AmountOverflow => BankError::AmountOverflow,
            other => BankError::Ledger(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// A deposit term. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Term {
    OneMonth,
    SixMonths,
    OneYear,
    ThreeYears,
}

impl Term {
    pub const ALL: [Term; 4] = [
        Term::OneMonth,
        Term::SixMonths,
        Term::OneYear,
        Term::ThreeYears,
    ];

    pub fn from_code(code: u8) -> Result<Self, BankError> {
        match code {
            0 => Ok(Term::OneMonth),
            1 => Ok(Term::SixMonths),
            2 => Ok(Term::OneYear),
            3 => Ok(Term::ThreeYears),
            other => Err(BankError::InvalidTerm(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Term::OneMonth => 0,
            Term::SixMonths => 1,
            Term::OneYear => 2,
            Term::ThreeYears => 3,
        }
    }

    pub fn months(self) -> u64 {
        match self {
            Term::OneMonth => 1,
            Term::SixMonths => 6,
            Term::OneYear => 12,
            Term::ThreeYears => 36,
        }
    }

    /// Lock duration in seconds (30-day months).
    pub fn lock_duration_secs(self) -> u64 {
        self.months() * SECONDS_PER_MONTH
    }

    pub fn label(self) -> &'static str {
        match self {
            Term::OneMonth => "1 month",
            Term::SixMonths => "6 months",
            Term::OneYear => "1 year",
            Term::ThreeYears => "3 years",
        }
    }

    /// `floor(principal * months / 100)`, computed in 128 bits.
    pub fn interest(self, principal: u64) -> u64 {
        // months <= 36, so the quotient always fits back in a u64.
        ((principal as u128 * self.months() as u128) / 100) as u64
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Term> for u8 {
    fn from(term: Term) -> u8 {
        term.code()
    }
}

impl TryFrom<u8> for Term {
    type Error = BankError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Term::from_code(code)
    }
}

/// Error returned when a term string matches no alias.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown term '{0}': expected 0-3, 1m, 6m, 1y, 3y or one-month, six-months, one-year, three-years")]
pub struct ParseTermError(pub String);

impl FromStr for Term {
    type Err = ParseTermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "1m" | "one-month" => Ok(Term::OneMonth),
            "1" | "6m" | "six-months" => Ok(Term::SixMonths),
            "2" | "1y" | "12m" | "one-year" => Ok(Term::OneYear),
            "3" | "3y" | "36m" | "three-years" => Ok(Term::ThreeYears),
            _ => Err(ParseTermError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One locked principal and its settlement state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: DepositId,
    pub owner: Address,
    pub principal: u64,
    pub term: Term,
    pub start_timestamp: u64,
    /// Flips false → true exactly once.
    pub withdrawn: bool,
}

impl DepositRecord {
    pub fn maturity_timestamp(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.term.lock_duration_secs())
    }

    pub fn interest(&self) -> u64 {
        self.term.interest(self.principal)
    }

    pub fn is_matured(&self, now: u64) -> bool {
        now >= self.maturity_timestamp()
    }
}

/// Read model of a deposit for clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositView {
    pub id: DepositId,
    pub owner: Address,
    pub principal: u64,
    pub term: Term,
    pub term_label: String,
    pub interest: u64,
    pub start_timestamp: u64,
    pub maturity_timestamp: u64,
    /// RFC 3339 rendering of `maturity_timestamp`.
    pub matures_at: String,
    pub matured: bool,
    pub withdrawn: bool,
}

fn rfc3339(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BankEvent {
    Deposited {
        owner: Address,
        deposit_id: DepositId,
        principal: u64,
        term: Term,
        start_timestamp: u64,
    },
    Withdrawn {
        owner: Address,
        deposit_id: DepositId,
        principal: u64,
        interest: u64,
    },
}

// ---------------------------------------------------------------------------
// FixedTermBank
// ---------------------------------------------------------------------------

/// The deposit manager. Holds records only; every token movement goes
/// through the [`ConfidentialLedger`] passed into each call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedTermBank {
    address: Address,
    deposits: BTreeMap<DepositId, DepositRecord>,
    by_owner: BTreeMap<Address, Vec<DepositId>>,
    next_id: DepositId,
    #[serde(skip)]
    events: EventLog<BankEvent>,
}

impl Default for FixedTermBank {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedTermBank {
    /// A bank at the standard contract address.
    pub fn new() -> Self {
        Self::with_address(Address::derive_contract(BANK_CONTRACT_LABEL))
    }

    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            deposits: BTreeMap::new(),
            by_owner: BTreeMap::new(),
            next_id: 1,
            events: EventLog::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Interest a deposit of `principal` for term `term_code` would earn.
    pub fn preview(term_code: u8, principal: u64) -> Result<u64, BankError> {
        Ok(Term::from_code(term_code)?.interest(principal))
    }

    // -- Queries ------------------------------------------------------------

    pub fn get_deposit(&self, id: DepositId) -> Result<&DepositRecord, BankError> {
        self.deposits.get(&id).ok_or(BankError::NotFound(id))
    }

    pub fn maturity_timestamp(&self, id: DepositId) -> Result<u64, BankError> {
        Ok(self.get_deposit(id)?.maturity_timestamp())
    }

    /// Every id ever created for `owner`, oldest first, withdrawn or not.
    pub fn user_deposit_ids(&self, owner: &Address) -> &[DepositId] {
        self.by_owner.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn deposit_view(&self, id: DepositId, now: u64) -> Result<DepositView, BankError> {
        let record = self.get_deposit(id)?;
        let maturity = record.maturity_timestamp();
        Ok(DepositView {
            id,
            owner: record.owner,
            principal: record.principal,
            term: record.term,
            term_label: record.term.label().to_string(),
            interest: record.interest(),
            start_timestamp: record.start_timestamp,
            maturity_timestamp: maturity,
            matures_at: rfc3339(maturity),
            matured: record.is_matured(now),
            withdrawn: record.withdrawn,
        })
    }

    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }

    /// Number of deposits not yet withdrawn.
    pub fn open_deposit_count(&self) -> usize {
        self.deposits.values().filter(|d| !d.withdrawn).count()
    }

    /// Sum of open principals: what the bank's ledger holding should be.
    pub fn locked_principal(&self) -> u64 {
        self.deposits
            .values()
            .filter(|d| !d.withdrawn)
            .fold(0u64, |acc, d| acc.saturating_add(d.principal))
    }

    pub fn events(&self) -> &[BankEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<BankEvent> {
        self.events.drain()
    }

    // -- Mutations ----------------------------------------------------------

    /// Lock `principal` of the caller's tokens for `term_code`.
    ///
    /// The caller must have made this bank a live operator on `ledger`. On
    /// any failure no record is created and no id is consumed.
    pub fn deposit<L: ConfidentialLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        principal: u64,
        term_code: u8,
    ) -> Result<DepositId, BankError> {
        if principal == 0 {
            return Err(BankError::InvalidAmount);
        }
        let term = Term::from_code(term_code)?;
        let owner = ctx.caller;
        if !ledger.is_operator(&owner, &self.address, ctx.timestamp) {
            debug!(%owner, "deposit refused: bank is not an operator");
            return Err(BankError::NotAuthorized);
        }

        ledger.debit(&ctx.as_contract(self.address), owner, principal)?;

        let id = self.next_id;
        self.next_id += 1;
        self.deposits.insert(
            id,
            DepositRecord {
                id,
                owner,
                principal,
                term,
                start_timestamp: ctx.timestamp,
                withdrawn: false,
            },
        );
        self.by_owner.entry(owner).or_default().push(id);

        info!(deposit_id = id, %owner, %term, principal, "deposit created");
        self.events.emit(BankEvent::Deposited {
            owner,
            deposit_id: id,
            principal,
            term,
            start_timestamp: ctx.timestamp,
        });
        Ok(id)
    }

    /// Settle a matured deposit and return the amount paid out.
    ///
    /// Checks run in this order: owner, maturity, already withdrawn.
    pub fn withdraw<L: ConfidentialLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        id: DepositId,
    ) -> Result<u64, BankError> {
        let record = self.get_deposit(id)?;
        if record.owner != ctx.caller {
            return Err(BankError::NotAuthorized);
        }
        let maturity = record.maturity_timestamp();
        if ctx.timestamp < maturity {
            return Err(BankError::DepositLocked {
                deposit_id: id,
                maturity,
                now: ctx.timestamp,
            });
        }
        if record.withdrawn {
            return Err(BankError::AlreadyWithdrawn(id));
        }

        let owner = record.owner;
        let principal = record.principal;
        let interest = record.interest();
        let payout = principal
            .checked_add(interest)
            .ok_or(BankError::AmountOverflow)?;

        let bank = self.address;
        let bank_ctx = ctx.as_contract(bank);
        ledger.atomically(|ledger| -> Result<(), BankError> {
            if interest > 0 {
                ledger.mint(&bank_ctx, bank, interest)?;
            }
            ledger.credit(&bank_ctx, owner, payout)?;
            Ok(())
        })?;

        if let Some(record) = self.deposits.get_mut(&id) {
            record.withdrawn = true;
        }

        info!(deposit_id = id, %owner, principal, interest, "deposit withdrawn");
        self.events.emit(BankEvent::Withdrawn {
            owner,
            deposit_id: id,
            principal,
            interest,
        });
        Ok(payout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
