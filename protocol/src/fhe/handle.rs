//! Opaque references to encrypted values.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::HANDLE_LENGTH;

/// A 32-byte reference to an encrypted `u64` held by the coprocessor.
///
/// Handles carry no information about the value behind them. Two handles to
/// the same plaintext are unrelated byte strings, and every arithmetic
/// operation yields a fresh handle, so observers cannot even tell whether a
/// balance changed by a large or a small amount.
///
/// The all-zero handle is reserved: it stands for an account that has never
/// been touched and decrypts to zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CiphertextHandle([u8; HANDLE_LENGTH]);

impl CiphertextHandle {
    /// The reserved "never written" handle.
    pub const UNINITIALIZED: Self = Self([0u8; HANDLE_LENGTH]);

    pub const fn from_bytes(bytes: [u8; HANDLE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_LENGTH] {
        &self.0
    }

    /// Whether this handle refers to a stored ciphertext.
    pub fn is_initialized(&self) -> bool {
        *self != Self::UNINITIALIZED
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse hex with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; HANDLE_LENGTH];
        hex::decode_to_slice(stripped, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({}..)", &self.to_hex()[..10])
    }
}

impl FromStr for CiphertextHandle {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for CiphertextHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for CiphertextHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            Ok(Self(<[u8; HANDLE_LENGTH]>::deserialize(deserializer)?))
        }
    }
}
