//! Fungible balance book shared by ordinary tokens and vault-factory shares.
//!
//! [`Erc20Book`] tracks per-holder balances, per-(owner, spender) allowances
//! and the total supply. It knows nothing about who is allowed to call what;
//! callers enforce authorization before touching it.

use std::collections::BTreeMap;

use super::TokenError;
use crate::types::{Address, Wei};

/// Balances, allowances and supply of a single token.
#[derive(Debug, Clone, Default)]
pub struct Erc20Book {
    balances: BTreeMap<Address, Wei>,
    allowances: BTreeMap<(Address, Address), Wei>,
    total_supply: Wei,
}

impl Erc20Book {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current total supply.
    pub fn total_supply(&self) -> Wei {
        self.total_supply
    }

    /// Balance of `holder`, 0 if unknown.
    pub fn balance_of(&self, holder: &Address) -> Wei {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Remaining allowance `owner` granted to `spender`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Wei {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Creates `amount` new units for `to`.
    ///
    /// # Errors
    ///
    /// [`TokenError::ZeroAddress`] for the null recipient,
    /// [`TokenError::SupplyOverflow`] if the supply would exceed `u128::MAX`.
    pub fn mint(&mut self, to: &Address, amount: Wei) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        let balance = self.balances.entry(*to).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        self.total_supply = new_supply;
        Ok(())
    }

    /// Destroys `amount` units held by `from`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientBalance`] if `from` holds less than `amount`.
    pub fn burn(&mut self, from: &Address, amount: Wei) -> Result<(), TokenError> {
        self.debit(from, amount)?;
        self.total_supply -= amount;
        Ok(())
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`TokenError::ZeroAddress`] if either side is null,
    /// [`TokenError::InsufficientBalance`] if `from` is short.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Wei) -> Result<(), TokenError> {
        if from.is_zero() || to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.debit(from, amount)?;
        // Supply is conserved, so the credit cannot overflow.
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    /// Sets the allowance `owner` grants `spender`, replacing any previous
    /// value.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Wei) {
        if amount == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), amount);
        }
    }

    /// Consumes `amount` of the allowance `owner` granted `spender`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientAllowance`] if the allowance is too small.
    pub fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: Wei,
    ) -> Result<(), TokenError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: *owner,
                spender: *spender,
                allowed,
                amount,
            });
        }
        self.approve(owner, spender, allowed - amount);
        Ok(())
    }

    fn debit(&mut self, holder: &Address, amount: Wei) -> Result<(), TokenError> {
        let balance = self.balance_of(holder);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                holder: *holder,
                balance,
                amount,
            });
        }
        if balance == amount {
            self.balances.remove(holder);
        } else {
            self.balances.insert(*holder, balance - amount);
        }
        Ok(())
    }
}
