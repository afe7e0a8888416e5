//! Ledger accounts.
//!
//! An [`Account`] is an `(owner, number)` pair naming a balance bucket in the
//! ledger. It is a value, not a stored object: two accounts with the same
//! owner and number are the same account.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Address;

/// Sub-account number under an owner. Number 0 is the owner's default
/// account; higher numbers are typically isolated borrow positions.
pub type AccountNumber = u128;

/// A balance bucket in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account {
    /// The address that controls the account.
    pub owner: Address,
    /// Sub-account number.
    pub number: AccountNumber,
}

impl Account {
    /// Creates an account.
    pub const fn new(owner: Address, number: AccountNumber) -> Self {
        Self { owner, number }
    }

    /// The owner's default (number 0) account.
    pub const fn default_of(owner: Address) -> Self {
        Self { owner, number: 0 }
    }

    /// Returns `true` if the owner is the null identifier.
    pub fn has_null_owner(&self) -> bool {
        self.owner.is_zero()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.number)
    }
}
