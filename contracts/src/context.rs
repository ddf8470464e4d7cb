//! Per-call execution context.

use serde::{Deserialize, Serialize};
use termvault_protocol::clock::Clock;
use termvault_protocol::identity::Address;

/// Who is calling and when.
///
/// The timestamp is read from the clock once, when the context is built,
/// and every check inside the call (operator liveness, maturity) uses that
/// same value. Nested calls a contract makes on a caller's behalf reuse it
/// through [`as_contract`](Self::as_contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }

    /// Build a context stamped with `clock`'s current time.
    pub fn at<C: Clock + ?Sized>(caller: Address, clock: &C) -> Self {
        Self::new(caller, clock.now())
    }

    /// The context a contract uses when it calls another contract while
    /// serving this call: same timestamp, the contract as caller.
    pub fn as_contract(&self, contract: Address) -> Self {
        Self::new(contract, self.timestamp)
    }
}
