//! # Core Types
//!
//! ```text
//! address.rs: 20-byte participant identifiers
//! account.rs: (owner, number) balance buckets
//! amount.rs: unsigned token amounts, signed balances, amount resolution
//! ```

pub mod account;
pub mod address;
pub mod amount;

pub use account::{Account, AccountNumber};
pub use address::{Address, AddressParseError, ADDRESS_LENGTH};
pub use amount::{to_signed, AssetAmount, SignedWei, Wei};

/// Dense market identifier assigned by the ledger, starting at 0.
pub type MarketId = u32;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;
