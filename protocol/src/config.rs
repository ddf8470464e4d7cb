//! # Protocol Configuration & Constants
//!
//! Every magic number in TermVault lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Some of these values are baked into persisted state (the address HRP, the
//! handle derivation context, the term arithmetic). Changing them after a
//! deployment has data on disk is a migration, not a config tweak.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version string reported by the node and embedded in status responses.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Human-readable prefix for Bech32 account addresses (`tv1...`).
pub const ADDRESS_HRP: &str = "tv";

/// Raw address length in bytes. Twenty bytes, same as the EVM world the
/// deposit product was first prototyped on.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Token Metadata
// ---------------------------------------------------------------------------

/// Display name of the confidential token.
pub const TOKEN_NAME: &str = "MockUSDT";

/// Ticker symbol of the confidential token.
pub const TOKEN_SYMBOL: &str = "mUSDT";

/// Decimal precision. All amounts are integer micro-units: `1_000_000`
/// units is one whole token.
pub const TOKEN_DECIMALS: u8 = 6;

/// One whole token expressed in base units.
pub const ONE_TOKEN: u64 = 10u64.pow(TOKEN_DECIMALS as u32);

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Seconds in a day. No leap seconds, no time zones, no drama.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Every "month" in the deposit schedule is exactly 30 days. Calendar months
/// would make maturity depend on the start date, which nobody wants to
/// explain to a customer.
pub const DAYS_PER_MONTH: u64 = 30;

/// One schedule month in seconds (2_592_000).
pub const SECONDS_PER_MONTH: u64 = DAYS_PER_MONTH * SECONDS_PER_DAY;

/// Operator grants issued by the tooling last one year unless told otherwise.
pub const DEFAULT_OPERATOR_GRANT_DAYS: u64 = 365;

/// Default validity window of a user-decryption request.
pub const DEFAULT_DECRYPT_DURATION_DAYS: u32 = 7;

/// Hard cap on a user-decryption request window. A signed request is a
/// bearer credential for the listed contracts; it should not outlive a year.
pub const MAX_DECRYPT_DURATION_DAYS: u32 = 365;

/// Maximum number of contract addresses a single decryption request may name.
pub const MAX_DECRYPT_CONTRACTS: usize = 10;

/// How many transfer-amount handles the ledger keeps decryptable. Older ones
/// are dropped from the ciphertext store; balances and the supply are never
/// subject to this limit.
pub const AMOUNT_HANDLE_RETENTION: usize = 1_024;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 signing key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// X25519 public key length, used for viewing keys.
pub const VIEWING_KEY_LENGTH: usize = 32;

/// AES-256-GCM key length in bytes. Also the size of the network key.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not 16. Not 8. Twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Ciphertext handle length in bytes (a BLAKE3 output).
pub const HANDLE_LENGTH: usize = 32;

/// BLAKE3 `derive_key` context for ciphertext handles.
pub const HANDLE_DERIVATION_CONTEXT: &str = "termvault v1 ciphertext handle";

/// BLAKE3 `derive_key` context for contract addresses.
pub const CONTRACT_ADDRESS_CONTEXT: &str = "termvault v1 contract address";

/// BLAKE3 `derive_key` context for the re-encryption session key.
pub const REENCRYPTION_KDF_CONTEXT: &str = "termvault v1 user decryption reencrypt";

/// Domain tag prefixed to every user-decryption signing payload.
pub const USER_DECRYPT_DOMAIN: &str = "termvault-user-decrypt-v1";

// ---------------------------------------------------------------------------
// Node Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// File name of the network key inside the node data directory.
pub const NETWORK_KEY_FILE: &str = "network.key";

/// Sub-directory of the node data directory that holds the sled database.
pub const DB_DIR_NAME: &str = "db";
