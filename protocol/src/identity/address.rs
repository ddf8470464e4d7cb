//! # Account Addresses
//!
//! An [`Address`] names every party that can hold a ledger balance: end users,
//! and contracts such as the deposit bank that take custody of funds.
//!
//! ```text
//! user:      public_key (32 bytes) -> BLAKE3 -> first 20 bytes
//! contract:  label -> BLAKE3-derive-key(CONTRACT_ADDRESS_CONTEXT) -> first 20 bytes
//!
//! rendered:  Bech32("tv", bytes) -> tv1qw508d6qe...
//! ```
//!
//! The two derivations live in separate BLAKE3 domains, so a contract
//! address can never coincide with a key-derived one by construction.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ADDRESS_HRP, ADDRESS_LENGTH, CONTRACT_ADDRESS_CONTEXT};
use crate::crypto::hash::{blake3_hash, domain_separated_hash};
use crate::crypto::keys::AccountPublicKey;

const HRP: Hrp = Hrp::parse_unchecked(ADDRESS_HRP);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an address.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The Bech32 string could not be decoded.
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded data has an unexpected length.
    #[error("invalid address data length: expected {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidDataLength(usize),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account address.
///
/// `Ord` is derived so addresses can key `BTreeMap`s; the ledger relies on
/// that for deterministic snapshot ordering.
///
/// # Examples
///
/// ```
/// use termvault_protocol::crypto::AccountKeypair;
/// use termvault_protocol::identity::Address;
///
/// let kp = AccountKeypair::generate();
/// let addr = Address::from_public_key(&kp.public_key());
/// let rendered = addr.to_string();
/// assert!(rendered.starts_with("tv1"));
/// assert_eq!(rendered.parse::<Address>().unwrap(), addr);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Wrap raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the address controlled by an Ed25519 public key.
    pub fn from_public_key(pk: &AccountPublicKey) -> Self {
        Self::truncate(&blake3_hash(pk.as_bytes()))
    }

    /// Derive a contract address from a deployment label, e.g.
    /// `"confidential-token"`. Same label, same address, on every node.
    pub fn derive_contract(label: &str) -> Self {
        Self::truncate(&domain_separated_hash(
            CONTRACT_ADDRESS_CONTEXT,
            label.as_bytes(),
        ))
    }

    fn truncate(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Encode as a Bech32 string with the `tv` prefix.
    pub fn to_bech32(&self) -> String {
        // A 20-byte payload is far below Bech32's length limit; encoding
        // cannot fail for any value of `self`.
        bech32::encode::<Bech32>(HRP, &self.0).unwrap_or_default()
    }

    /// Parse a Bech32 address, validating HRP, checksum and length.
    pub fn from_bech32(s: &str) -> Result<Self, AddressError> {
        let (hrp, data) = bech32::decode(s).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        if hrp != HRP {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }

        let bytes: [u8; ADDRESS_LENGTH] = data
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidDataLength(data.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bech32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_bech32())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_bech32())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_bech32(&s).map_err(serde::de::Error::custom)
        } else {
            Ok(Self(<[u8; ADDRESS_LENGTH]>::deserialize(deserializer)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::AccountKeypair;

    #[test]
    fn bech32_roundtrip() {
        let addr = Address::from_public_key(&AccountKeypair::generate().public_key());
        let encoded = addr.to_bech32();
        assert!(encoded.starts_with("tv1"));
        assert_eq!(Address::from_bech32(&encoded).unwrap(), addr);
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let kp = AccountKeypair::from_seed(&[9u8; 32]);
        assert_eq!(
            Address::from_public_key(&kp.public_key()),
            Address::from_public_key(&kp.public_key())
        );
    }

    #[test]
    fn contract_addresses_depend_on_label() {
        let token = Address::derive_contract("confidential-token");
        let bank = Address::derive_contract("fixed-term-bank");
        assert_ne!(token, bank);
        assert_eq!(token, Address::derive_contract("confidential-token"));
    }

    #[test]
    fn wrong_hrp_rejected() {
        let other = bech32::encode::<Bech32>(Hrp::parse("xx").unwrap(), &[1u8; 20]).unwrap();
        assert!(matches!(
            Address::from_bech32(&other),
            Err(AddressError::InvalidHrp { .. })
        ));
    }

    #[test]
    fn wrong_length_rejected() {
        let long = bech32::encode::<Bech32>(HRP, &[1u8; 32]).unwrap();
        assert!(matches!(
            Address::from_bech32(&long),
            Err(AddressError::InvalidDataLength(32))
        ));
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut encoded = Address::from_bytes([3u8; 20]).to_bech32();
        let last = encoded.pop().unwrap();
        encoded.push(if last == 'q' { 'p' } else { 'q' });
        assert!(Address::from_bech32(&encoded).is_err());
    }

    #[test]
    fn serde_json_uses_bech32() {
        let addr = Address::from_bytes([7u8; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn bincode_uses_raw_bytes() {
        let addr = Address::from_bytes([7u8; 20]);
        let bytes = bincode::serialize(&addr).unwrap();
        assert_eq!(bytes.len(), 20);
        let back: Address = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, addr);
    }
}
