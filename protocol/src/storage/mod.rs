//! # Storage Module
//!
//! Persistence for a TermVault node. The engine lives in memory; sled holds
//! a bincode snapshot of it and the append-only event log, so a restarted
//! node comes back exactly where it stopped.
//!
//! Bincode for snapshots (compact, internal). JSON for events (they are
//! served to clients verbatim).

pub mod db;

pub use db::{DbError, DbResult, TermVaultDb};
