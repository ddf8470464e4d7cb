// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # TermVault Protocol Core Library
//!
//! The confidentiality substrate under the TermVault ledger and deposit
//! bank. Nothing in here knows what a deposit is. It knows how to hold a
//! `u64` nobody can read, how to add to it, how to refuse a subtraction
//! that would go negative, and how to hand the value back to exactly one
//! person who proves they are allowed to see it.
//!
//! Ed25519 for account signatures, X25519 for viewing keys, AES-256-GCM for
//! everything at rest, BLAKE3 for every derivation.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants. Token metadata lives here too.
//! - **crypto**: Account keys, symmetric sealing, sealed boxes, hashing.
//! - **identity**: Bech32 `tv1…` addresses for users and contracts.
//! - **fhe**: Ciphertext handles, the encrypted-arithmetic trait, the
//!   reference coprocessor and the user-decryption protocol.
//! - **clock**: The one source of "now". Injected, never read ambiently.
//! - **storage**: sled persistence for node snapshots and the event log.
//!
//! ## Design Philosophy
//!
//! 1. Plaintext balances never leave the coprocessor except sealed to a
//!    viewing key.
//! 2. Time is an input, not a side effect.
//! 3. If it touches money, it has tests. Plural.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod fhe;
pub mod identity;
pub mod storage;
