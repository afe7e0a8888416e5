//! Amount types.
//!
//! Token amounts are unsigned `u128` values in the token's smallest unit
//! ("wei"). Ledger balances are signed ([`SignedWei`]): a negative balance is
//! a borrow. No floating point anywhere.

use serde::{Deserialize, Serialize};

use crate::config::MAX_AMOUNT_SENTINEL;

/// Unsigned token amount.
pub type Wei = u128;

/// Signed ledger balance. Negative means the account owes the market.
pub type SignedWei = i128;

/// How much an action moves, resolved by the ledger at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssetAmount {
    /// Exactly this many wei.
    Wei(Wei),
    /// The account's whole positive balance in the action's market.
    All,
    /// Whatever the previous `Sell`/`Trade` action in the same operation
    /// produced.
    LastOutput,
}

impl AssetAmount {
    /// Maps a caller-supplied amount onto [`AssetAmount`], treating the
    /// sentinel as "everything".
    pub fn from_input(amount: Wei) -> Self {
        if amount == MAX_AMOUNT_SENTINEL {
            AssetAmount::All
        } else {
            AssetAmount::Wei(amount)
        }
    }
}

/// Converts an unsigned amount into a signed delta, failing if it does not
/// fit.
pub fn to_signed(amount: Wei) -> Option<SignedWei> {
    SignedWei::try_from(amount).ok()
}
