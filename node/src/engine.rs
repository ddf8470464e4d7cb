//! # Engine
//!
//! The node's serial log. One [`Engine`] owns the coprocessor, the ledger
//! and the bank behind a single mutex, so every mutating call is totally
//! ordered against every other one. Each call:
//!
//! 1. locks the state,
//! 2. reads the clock exactly once into a [`CallContext`],
//! 3. runs the core operation (which is all-or-nothing on its own),
//! 4. drains the emitted events and commits snapshot + events to sled,
//! 5. publishes the sequenced events to live subscribers.
//!
//! Step 4 is a single sled transaction. If it fails, the in-memory state is
//! reloaded from the last committed snapshot, so memory never runs ahead of
//! disk. If even that reload fails the engine is poisoned: it keeps serving
//! reads but refuses every further mutation until restarted.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use termvault_contracts::{
    BankError, BankEvent, CallContext, ConfidentialToken, DepositId, DepositView, FixedTermBank,
    LedgerError, LedgerEvent, Term,
};
use termvault_protocol::clock::Clock;
use termvault_protocol::config::{
    DEFAULT_OPERATOR_GRANT_DAYS, PROTOCOL_VERSION, SECONDS_PER_DAY,
};
use termvault_protocol::fhe::{
    CiphertextHandle, Coprocessor, DecryptionError, HandleContractPair, NetworkKey,
    ReencryptedValue, SignedDecryptRequest,
};
use termvault_protocol::identity::Address;
use termvault_protocol::storage::{DbError, TermVaultDb};

use crate::metrics::SharedMetrics;

/// Key of the engine snapshot in the `state` tree.
pub const SNAPSHOT_NAME: &str = "engine";

/// Capacity of the live event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on one `/events` page.
pub const MAX_EVENT_PAGE: usize = 1_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),

    /// The snapshot on disk was written under a different network key.
    #[error("network key {actual} does not match snapshot key {expected}")]
    NetworkKeyMismatch { expected: String, actual: String },

    /// A failed commit could not be rolled back; the node must restart.
    #[error("engine state diverged from disk; restart the node")]
    Poisoned,
}

impl EngineError {
    /// Stable, snake_case name of the error kind. Used as the metrics label
    /// and echoed to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Ledger(e) => match e {
                LedgerError::InvalidAmount => "invalid_amount",
                LedgerError::InvalidExpiry { .. } => "invalid_expiry",
                LedgerError::NotAuthorized { .. } => "not_authorized",
                LedgerError::InsufficientBalance { .. } => "insufficient_balance",
                LedgerError::AmountOverflow => "amount_overflow",
                LedgerError::Fhe(_) => "internal",
            },
            EngineError::Bank(e) => match e {
                BankError::InvalidAmount => "invalid_amount",
                BankError::InvalidTerm(_) => "invalid_term",
                BankError::NotAuthorized => "not_authorized",
                BankError::InsufficientBalance => "insufficient_balance",
                BankError::DepositLocked { .. } => "deposit_locked",
                BankError::AlreadyWithdrawn(_) => "already_withdrawn",
                BankError::NotFound(_) => "not_found",
                BankError::AmountOverflow => "amount_overflow",
                BankError::Ledger(_) => "internal",
            },
            EngineError::Decryption(e) => match e {
                DecryptionError::InvalidSignature
                | DecryptionError::SignerMismatch { .. }
                | DecryptionError::ContractNotAuthorized(_)
                | DecryptionError::AccessDenied { .. } => "access_denied",
                DecryptionError::Fhe(_) | DecryptionError::Reencryption(_) => "internal",
                _ => "invalid_request",
            },
            EngineError::Storage(_) => "storage",
            EngineError::NetworkKeyMismatch { .. } => "network_key_mismatch",
            EngineError::Poisoned => "poisoned",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything the node persists to its event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum ChainEvent {
    Ledger(LedgerEvent),
    Bank(BankEvent),
}

/// A [`ChainEvent`] with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub seq: u64,
    pub event: ChainEvent,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// What gets snapshotted: the ledger (with its coprocessor) and the bank.
#[derive(Debug, Serialize, Deserialize)]
struct EngineState {
    /// Fingerprint of the network key the ciphertexts are sealed under.
    key_fingerprint: String,
    token: ConfidentialToken,
    bank: FixedTermBank,
}

impl EngineState {
    fn fresh(key: NetworkKey, auditor: Option<Address>) -> Self {
        let key_fingerprint = key.fingerprint();
        let mut token = ConfidentialToken::new(Coprocessor::new(key));
        if let Some(auditor) = auditor {
            token = token.with_auditor(auditor);
        }
        Self {
            key_fingerprint,
            token,
            bank: FixedTermBank::new(),
        }
    }

    /// Ledger events first: within one call the ledger always moves before
    /// the bank records anything.
    fn drain_events(&mut self) -> Vec<ChainEvent> {
        let mut out: Vec<ChainEvent> = self
            .token
            .drain_events()
            .into_iter()
            .map(ChainEvent::Ledger)
            .collect();
        out.extend(self.bank.drain_events().into_iter().map(ChainEvent::Bank));
        out
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: CiphertextHandle,
    pub account_count: usize,
    pub auditor: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorStatus {
    pub owner: Address,
    pub operator: Address,
    pub expiry: Option<u64>,
    pub live: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    pub deposit_id: DepositId,
    pub principal: u64,
    pub interest: u64,
    pub payout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub version: String,
    pub now: u64,
    pub token_address: Address,
    pub bank_address: Address,
    pub account_count: usize,
    pub deposit_count: usize,
    pub open_deposits: usize,
    pub locked_principal: u64,
    pub ciphertext_count: usize,
    pub event_count: usize,
    pub key_fingerprint: String,
    pub poisoned: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    state: Mutex<EngineState>,
    poisoned: AtomicBool,
    network_key: NetworkKey,
    clock: Arc<dyn Clock>,
    db: TermVaultDb,
    metrics: SharedMetrics,
    events_tx: broadcast::Sender<SequencedEvent>,
}

impl Engine {
    /// Load the engine from `db`, or start a fresh one if the database is
    /// empty. `auditor` only applies to a fresh engine.
    pub fn open(
        db: TermVaultDb,
        network_key: NetworkKey,
        clock: Arc<dyn Clock>,
        metrics: SharedMetrics,
        auditor: Option<Address>,
    ) -> EngineResult<Self> {
        let state = match load_state(&db, &network_key)? {
            Some(state) => {
                if auditor.is_some() && auditor != state.token.auditor() {
                    warn!("--auditor ignored: the ledger was created with a different auditor");
                }
                info!(
                    deposits = state.bank.deposit_count(),
                    accounts = state.token.account_count(),
                    "engine restored from snapshot"
                );
                state
            }
            None => {
                let state = EngineState::fresh(network_key.clone(), auditor);
                db.put_snapshot(SNAPSHOT_NAME, &state)?;
                db.flush()?;
                info!(token = %state.token.address(), bank = %state.bank.address(), "fresh engine created");
                state
            }
        };

        metrics.set_bank_gauges(state.bank.open_deposit_count(), state.bank.locked_principal());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            state: Mutex::new(state),
            poisoned: AtomicBool::new(false),
            network_key,
            clock,
            db,
            metrics,
            events_tx,
        })
    }

    /// Subscribe to events as they are committed.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.events_tx.subscribe()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // -- Mutations ----------------------------------------------------------

    /// Issue `amount` to `to`. Returns the new balance handle of `to`.
    pub fn mint(&self, caller: Address, to: Address, amount: u64) -> EngineResult<CiphertextHandle> {
        let handle = self.apply(caller, |state, ctx| Ok(state.token.mint(ctx, to, amount)?))?;
        self.metrics.mints_total.inc();
        Ok(handle)
    }

    /// Grant `operator` pull rights over `caller`'s balance. Without an
    /// explicit `until` the grant lasts [`DEFAULT_OPERATOR_GRANT_DAYS`].
    pub fn set_operator(
        &self,
        caller: Address,
        operator: Address,
        until: Option<u64>,
    ) -> EngineResult<OperatorStatus> {
        let expiry = self.apply(caller, |state, ctx| {
            let until = until.unwrap_or_else(|| {
                ctx.timestamp
                    .saturating_add(DEFAULT_OPERATOR_GRANT_DAYS * SECONDS_PER_DAY)
            });
            state.token.set_operator(ctx, operator, until)?;
            Ok(until)
        })?;
        self.metrics.operator_grants_total.inc();
        Ok(OperatorStatus {
            owner: caller,
            operator,
            expiry: Some(expiry),
            live: true,
        })
    }

    /// Lock `principal` of `caller`'s tokens under `term_code`.
    pub fn deposit(&self, caller: Address, principal: u64, term_code: u8) -> EngineResult<DepositView> {
        let view = self.apply(caller, |state, ctx| {
            let EngineState { token, bank, .. } = state;
            let id = bank.deposit(token, ctx, principal, term_code)?;
            Ok(bank.deposit_view(id, ctx.timestamp)?)
        })?;
        self.metrics.deposits_total.inc();
        Ok(view)
    }

    /// Settle a matured deposit owned by `caller`.
    pub fn withdraw(&self, caller: Address, id: DepositId) -> EngineResult<WithdrawReceipt> {
        let receipt = self.apply(caller, |state, ctx| {
            let EngineState { token, bank, .. } = state;
            let payout = bank.withdraw(token, ctx, id)?;
            let record = bank.get_deposit(id)?;
            Ok(WithdrawReceipt {
                deposit_id: id,
                principal: record.principal,
                interest: record.interest(),
                payout,
            })
        })?;
        self.metrics.withdrawals_total.inc();
        Ok(receipt)
    }

    /// Run one mutating call as a single entry of the serial log.
    fn apply<T, F>(&self, caller: Address, op: F) -> EngineResult<T>
    where
        F: FnOnce(&mut EngineState, &CallContext) -> EngineResult<T>,
    {
        let mut state = self.state.lock();
        if self.poisoned.load(Ordering::Acquire) {
            self.metrics.reject(EngineError::Poisoned.kind());
            return Err(EngineError::Poisoned);
        }
        let ctx = CallContext::at(caller, self.clock.as_ref());

        let out = match op(&mut state, &ctx) {
            Ok(out) => out,
            Err(e) => {
                warn!(caller = %ctx.caller, kind = e.kind(), "call rejected: {}", e);
                self.metrics.reject(e.kind());
                return Err(e);
            }
        };

        let events = state.drain_events();
        let seqs = match self.db.commit(SNAPSHOT_NAME, &*state, &events) {
            Ok(seqs) => seqs,
            Err(e) => {
                error!("commit failed, restoring last snapshot: {}", e);
                self.metrics.reject("storage");
                self.restore_committed(&mut state);
                return Err(e.into());
            }
        };

        self.metrics
            .set_bank_gauges(state.bank.open_deposit_count(), state.bank.locked_principal());

        for (seq, event) in seqs.into_iter().zip(events) {
            debug!(seq, "event committed");
            // No subscribers is not an error.
            let _ = self.events_tx.send(SequencedEvent { seq, event });
        }
        Ok(out)
    }

    /// Replace `state` with the last committed snapshot, or poison the
    /// engine if that snapshot cannot be read back.
    fn restore_committed(&self, state: &mut EngineState) {
        match load_state(&self.db, &self.network_key) {
            Ok(Some(restored)) => *state = restored,
            Ok(None) => {
                error!("no committed snapshot to restore; engine poisoned");
                self.poisoned.store(true, Ordering::Release);
            }
            Err(e) => {
                error!("failed to restore last snapshot, engine poisoned: {}", e);
                self.poisoned.store(true, Ordering::Release);
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    // -- Queries ------------------------------------------------------------

    pub fn token_info(&self) -> TokenInfo {
        let state = self.state.lock();
        let token = &state.token;
        TokenInfo {
            address: token.address(),
            name: token.name().to_string(),
            symbol: token.symbol().to_string(),
            decimals: token.decimals(),
            total_supply: token.total_supply_handle(),
            account_count: token.account_count(),
            auditor: token.auditor(),
        }
    }

    pub fn balance_handle(&self, account: &Address) -> CiphertextHandle {
        self.state.lock().token.balance_handle(account)
    }

    pub fn operator_status(&self, owner: Address, operator: Address) -> OperatorStatus {
        let now = self.clock.now();
        let state = self.state.lock();
        OperatorStatus {
            owner,
            operator,
            expiry: state.token.operator_expiry(&owner, &operator),
            live: state.token.is_operator(&owner, &operator, now),
        }
    }

    pub fn deposit_view(&self, id: DepositId) -> EngineResult<DepositView> {
        let now = self.clock.now();
        Ok(self.state.lock().bank.deposit_view(id, now)?)
    }

    /// All deposits of `owner`, in creation order.
    pub fn user_deposits(&self, owner: &Address) -> EngineResult<Vec<DepositView>> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .bank
            .user_deposit_ids(owner)
            .iter()
            .map(|id| state.bank.deposit_view(*id, now).map_err(EngineError::from))
            .collect()
    }

    /// Serve a user-decryption request against the ledger's ciphertexts.
    pub fn user_decrypt(
        &self,
        request: &SignedDecryptRequest,
        pairs: &[HandleContractPair],
    ) -> EngineResult<Vec<ReencryptedValue>> {
        let now = self.clock.now();
        let state = self.state.lock();
        match state.token.executor().user_decrypt(request, pairs, now) {
            Ok(values) => Ok(values),
            Err(e) => {
                let e = EngineError::from(e);
                warn!(user = %request.user, kind = e.kind(), "decryption refused: {}", e);
                self.metrics.reject(e.kind());
                Err(e)
            }
        }
    }

    /// Committed events with sequence number `>= from`.
    pub fn events_from(&self, from: u64, limit: usize) -> EngineResult<Vec<SequencedEvent>> {
        let page = self
            .db
            .events_from::<ChainEvent>(from, limit.min(MAX_EVENT_PAGE))?;
        Ok(page
            .into_iter()
            .map(|(seq, event)| SequencedEvent { seq, event })
            .collect())
    }

    pub fn status(&self) -> EngineStatus {
        let now = self.clock.now();
        let state = self.state.lock();
        EngineStatus {
            version: PROTOCOL_VERSION.to_string(),
            now,
            token_address: state.token.address(),
            bank_address: state.bank.address(),
            account_count: state.token.account_count(),
            deposit_count: state.bank.deposit_count(),
            open_deposits: state.bank.open_deposit_count(),
            locked_principal: state.bank.locked_principal(),
            ciphertext_count: state.token.executor().ciphertext_count(),
            event_count: self.db.event_count(),
            key_fingerprint: state.key_fingerprint.clone(),
            poisoned: self.is_poisoned(),
        }
    }
}

/// Interest preview for `principal` under `term`. Pure.
pub fn preview(term: Term, principal: u64) -> EngineResult<u64> {
    Ok(FixedTermBank::preview(term.code(), principal)?)
}

/// Read the snapshot and re-attach the network key.
fn load_state(db: &TermVaultDb, key: &NetworkKey) -> EngineResult<Option<EngineState>> {
    let Some(mut state) = db.get_snapshot::<EngineState>(SNAPSHOT_NAME)? else {
        return Ok(None);
    };
    let actual = key.fingerprint();
    if state.key_fingerprint != actual {
        return Err(EngineError::NetworkKeyMismatch {
            expected: state.key_fingerprint,
            actual,
        });
    }
    state.token.executor_mut().attach_network_key(key.clone());
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use termvault_protocol::clock::ManualClock;
    use termvault_protocol::config::SECONDS_PER_MONTH;
    use termvault_protocol::crypto::keys::AccountKeypair;
    use termvault_protocol::fhe::DecryptionSession;

    const T0: u64 = 1_760_000_000;

    fn engine_with(db: TermVaultDb, key: NetworkKey, clock: &ManualClock) -> Engine {
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        Engine::open(db, key, Arc::new(clock.clone()), metrics, None).unwrap()
    }

    fn user() -> (AccountKeypair, Address) {
        let key = AccountKeypair::generate();
        let addr = Address::from_public_key(&key.public_key());
        (key, addr)
    }

    fn read_balance(engine: &Engine, key: &AccountKeypair, account: Address) -> u64 {
        let token = engine.token_info().address;
        let session = DecryptionSession::new(key, vec![token], engine.now(), 1);
        let handle = engine.balance_handle(&account);
        let values = engine
            .user_decrypt(
                session.signed_request(),
                &[HandleContractPair {
                    handle,
                    contract: token,
                }],
            )
            .unwrap();
        session.open(&values[0]).unwrap()
    }

    #[test]
    fn full_cycle_commits_events_in_order() {
        let clock = ManualClock::new(T0);
        let engine = engine_with(TermVaultDb::open_temporary().unwrap(), NetworkKey::generate(), &clock);
        let (alice_key, alice) = user();
        let bank = engine.status().bank_address;

        engine.mint(alice, alice, 100).unwrap();
        engine.set_operator(alice, bank, None).unwrap();
        let view = engine.deposit(alice, 100, 0).unwrap();
        assert_eq!(view.id, 1);
        assert_eq!(read_balance(&engine, &alice_key, alice), 0);

        clock.advance(SECONDS_PER_MONTH);
        let receipt = engine.withdraw(alice, view.id).unwrap();
        assert_eq!(receipt.payout, 101);
        assert_eq!(read_balance(&engine, &alice_key, alice), 101);

        let events = engine.events_from(0, 100).unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (0..events.len() as u64).collect::<Vec<_>>());
        assert!(matches!(
            events.last().map(|e| &e.event),
            Some(ChainEvent::Bank(BankEvent::Withdrawn { interest: 1, .. }))
        ));
    }

    #[test]
    fn rejected_calls_leave_no_events() {
        let clock = ManualClock::new(T0);
        let engine = engine_with(TermVaultDb::open_temporary().unwrap(), NetworkKey::generate(), &clock);
        let (_, alice) = user();

        let err = engine.deposit(alice, 10, 0).unwrap_err();
        assert_eq!(err.kind(), "not_authorized");
        let err = engine.deposit(alice, 10, 9).unwrap_err();
        assert_eq!(err.kind(), "invalid_term");
        assert!(engine.events_from(0, 10).unwrap().is_empty());
        assert_eq!(engine.status().deposit_count, 0);
    }

    #[test]
    fn restart_restores_state_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let key = NetworkKey::generate();
        let clock = ManualClock::new(T0);
        let (alice_key, alice) = user();

        {
            let engine = engine_with(TermVaultDb::open(dir.path()).unwrap(), key.clone(), &clock);
            let bank = engine.status().bank_address;
            engine.mint(alice, alice, 500).unwrap();
            engine.set_operator(alice, bank, None).unwrap();
            engine.deposit(alice, 200, 1).unwrap();
        }

        let engine = engine_with(TermVaultDb::open(dir.path()).unwrap(), key, &clock);
        let status = engine.status();
        assert_eq!(status.deposit_count, 1);
        assert_eq!(status.locked_principal, 200);
        assert_eq!(read_balance(&engine, &alice_key, alice), 300);
        assert_eq!(engine.user_deposits(&alice).unwrap()[0].interest, 12);

        // Ids keep counting after a restart.
        assert_eq!(engine.deposit(alice, 50, 0).unwrap().id, 2);
    }

    #[test]
    fn wrong_network_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(T0);
        drop(engine_with(
            TermVaultDb::open(dir.path()).unwrap(),
            NetworkKey::generate(),
            &clock,
        ));

        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let res = Engine::open(
            TermVaultDb::open(dir.path()).unwrap(),
            NetworkKey::generate(),
            Arc::new(clock),
            metrics,
            None,
        );
        assert!(matches!(res, Err(EngineError::NetworkKeyMismatch { .. })));
    }

    #[test]
    fn restore_discards_uncommitted_changes() {
        let clock = ManualClock::new(T0);
        let engine = engine_with(TermVaultDb::open_temporary().unwrap(), NetworkKey::generate(), &clock);
        let (alice_key, alice) = user();
        engine.mint(alice, alice, 10).unwrap();

        {
            let mut state = engine.state.lock();
            state
                .token
                .mint(&CallContext::new(alice, T0), alice, 5)
                .unwrap();
            engine.restore_committed(&mut state);
        }

        assert!(!engine.is_poisoned());
        assert_eq!(read_balance(&engine, &alice_key, alice), 10);
        assert_eq!(engine.mint(alice, alice, 1).unwrap(), engine.balance_handle(&alice));
        assert_eq!(read_balance(&engine, &alice_key, alice), 11);
    }

    #[test]
    fn unreadable_snapshot_poisons_engine() {
        let clock = ManualClock::new(T0);
        let db = TermVaultDb::open_temporary().unwrap();
        let engine = engine_with(db.clone(), NetworkKey::generate(), &clock);
        let (_, alice) = user();
        engine.mint(alice, alice, 10).unwrap();

        db.put_snapshot(SNAPSHOT_NAME, &0u8).unwrap();
        {
            let mut state = engine.state.lock();
            engine.restore_committed(&mut state);
        }

        assert!(engine.is_poisoned());
        assert!(engine.status().poisoned);
        let err = engine.mint(alice, alice, 1).unwrap_err();
        assert_eq!(err.kind(), "poisoned");
        assert_eq!(engine.events_from(0, 10).unwrap().len(), 1);
        assert_eq!(engine.token_info().account_count, 1);
    }

    #[test]
    fn ciphertexts_track_accounts_not_history() {
        let clock = ManualClock::new(T0);
        let engine = engine_with(TermVaultDb::open_temporary().unwrap(), NetworkKey::generate(), &clock);
        let (alice_key, alice) = user();

        for _ in 0..50 {
            engine.mint(alice, alice, 2).unwrap();
        }

        // One balance, the supply, and one amount handle per mint.
        assert_eq!(engine.status().ciphertext_count, 1 + 1 + 50);
        assert_eq!(read_balance(&engine, &alice_key, alice), 100);
    }

    #[tokio::test]
    async fn subscribers_see_committed_events() {
        let clock = ManualClock::new(T0);
        let engine = engine_with(TermVaultDb::open_temporary().unwrap(), NetworkKey::generate(), &clock);
        let mut rx = engine.subscribe();
        let (_, alice) = user();

        engine.mint(alice, alice, 5).unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.seq, 0);
        assert!(matches!(ev.event, ChainEvent::Ledger(LedgerEvent::Minted { to, .. }) if to == alice));
    }

    #[test]
    fn chain_event_json_shape() {
        let (_, alice) = user();
        let ev = SequencedEvent {
            seq: 7,
            event: ChainEvent::Bank(BankEvent::Withdrawn {
                owner: alice,
                deposit_id: 1,
                principal: 100,
                interest: 1,
            }),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["event"]["source"], "bank");
        assert_eq!(json["event"]["data"]["type"], "withdrawn");
        assert_eq!(json["event"]["data"]["interest"], 1);
        let back: SequencedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
