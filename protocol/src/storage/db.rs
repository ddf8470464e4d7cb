//! # TermVaultDb, the Persistent Storage Engine
//!
//! The persistence layer for a TermVault node, built on sled's embedded
//! key-value store. The node keeps its entire engine in memory and uses
//! this module for two things only: a snapshot of that engine after each
//! committed mutation, and an append-only log of the events the mutation
//! emitted.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                 | Value                    |
//! |------------|---------------------|--------------------------|
//! | `state`    | name (UTF-8)        | `bincode(snapshot)`      |
//! | `events`   | `seq` (8B BE)       | `json(event)`            |
//! | `metadata` | key (UTF-8)         | value (bytes)            |
//!
//! Event sequence numbers are stored as big-endian u64 so that sled's
//! lexicographic ordering matches numeric ordering, and `events_from` is a
//! plain range scan.
//!
//! Events are stored as JSON rather than bincode: they are internally tagged
//! enums, which bincode cannot round-trip, and they are served to HTTP
//! clients as JSON anyway.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<TransactionError<DbError>> for DbError {
    fn from(err: TransactionError<DbError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => DbError::Sled(e),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Next event sequence number to hand out.
const META_NEXT_EVENT_SEQ: &[u8] = b"next_event_seq";

// ---------------------------------------------------------------------------
// TermVaultDb
// ---------------------------------------------------------------------------

/// Persistent storage for engine snapshots and the event log.
///
/// sled trees are safe to share across threads; `TermVaultDb` is cheap to
/// clone and can sit behind an `Arc` without further locking. Callers that
/// need "snapshot and its events land together" semantics get them from
/// [`commit`](Self::commit), which writes all three trees in one sled
/// transaction.
#[derive(Debug, Clone)]
pub struct TermVaultDb {
    db: Db,
    state: Tree,
    events: Tree,
    metadata: Tree,
}

impl TermVaultDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let state = db.open_tree("state")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            state,
            events,
            metadata,
        })
    }

    // -- Snapshot operations ------------------------------------------------

    /// Store a bincode snapshot under `name`, replacing any previous one.
    pub fn put_snapshot<T: Serialize>(&self, name: &str, value: &T) -> DbResult<()> {
        let bytes = encode_snapshot(value)?;
        self.state.insert(name.as_bytes(), bytes)?;
        Ok(())
    }

    /// Load the snapshot stored under `name`, if any.
    pub fn get_snapshot<T: DeserializeOwned>(&self, name: &str) -> DbResult<Option<T>> {
        match self.state.get(name.as_bytes())? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // -- Event log ----------------------------------------------------------

    /// Append one event and return its sequence number.
    pub fn append_event<E: Serialize>(&self, event: &E) -> DbResult<u64> {
        let bytes = encode_event(event)?;
        let seq = (&self.events, &self.metadata).transaction(|(events, metadata)| {
            let seq = next_seq_in(metadata)?;
            events.insert(seq.to_be_bytes().to_vec(), bytes.as_slice())?;
            metadata.insert(META_NEXT_EVENT_SEQ, (seq + 1).to_be_bytes().to_vec())?;
            Ok(seq)
        })?;
        Ok(seq)
    }

    /// Events with sequence number `>= from`, oldest first, at most `limit`.
    pub fn events_from<E: DeserializeOwned>(
        &self,
        from: u64,
        limit: usize,
    ) -> DbResult<Vec<(u64, E)>> {
        let mut out = Vec::new();
        for result in self.events.range(from.to_be_bytes()..).take(limit) {
            let (key, value) = result?;
            let seq = decode_seq(&key)?;
            let event = serde_json::from_slice(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            out.push((seq, event));
        }
        Ok(out)
    }

    /// Number of events in the log.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    // -- Combined -----------------------------------------------------------

    /// Persist a snapshot together with the events that produced it, then
    /// flush. Returns the sequence numbers assigned to the events.
    ///
    /// The snapshot, the events and the advanced sequence counter land in
    /// one transaction: on error none of them is visible.
    pub fn commit<T: Serialize, E: Serialize>(
        &self,
        name: &str,
        snapshot: &T,
        events: &[E],
    ) -> DbResult<Vec<u64>> {
        let snapshot_bytes = encode_snapshot(snapshot)?;
        let event_bytes = events
            .iter()
            .map(encode_event)
            .collect::<DbResult<Vec<_>>>()?;

        let seqs = (&self.state, &self.events, &self.metadata).transaction(
            |(state, events, metadata)| {
                state.insert(name.as_bytes(), snapshot_bytes.as_slice())?;

                let first = next_seq_in(metadata)?;
                let mut seqs = Vec::with_capacity(event_bytes.len());
                for (i, bytes) in event_bytes.iter().enumerate() {
                    let seq = first + i as u64;
                    events.insert(seq.to_be_bytes().to_vec(), bytes.as_slice())?;
                    seqs.push(seq);
                }
                metadata.insert(
                    META_NEXT_EVENT_SEQ,
                    (first + event_bytes.len() as u64).to_be_bytes().to_vec(),
                )?;
                Ok(seqs)
            },
        )?;

        self.db.flush()?;
        Ok(seqs)
    }

    // -- Utility operations -------------------------------------------------

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// The sequence counter as seen from inside a transaction.
fn next_seq_in(metadata: &TransactionalTree) -> ConflictableTransactionResult<u64, DbError> {
    match metadata.get(META_NEXT_EVENT_SEQ)? {
        Some(bytes) => decode_seq(&bytes).map_err(ConflictableTransactionError::Abort),
        None => Ok(0),
    }
}

fn encode_snapshot<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn encode_event<E: Serialize>(event: &E) -> DbResult<Vec<u8>> {
    serde_json::to_vec(event).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_seq(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid sequence bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
