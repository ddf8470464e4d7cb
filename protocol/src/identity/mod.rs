//! # Identity Module
//!
//! Who can hold a balance. Every participant is an [`Address`]: users derive
//! theirs from an Ed25519 public key, contracts from a deployment label.

pub mod address;

pub use address::{Address, AddressError};
