//! # Token Bank
//!
//! Wallet-level balances of ordinary tokens: the assets users hold outside
//! the ledger, that converters keep as inventory, and that the ledger itself
//! custodies. Each token is registered once under its address and tracked by
//! an [`Erc20Book`].
//!
//! ## Security Model
//!
//! - **Mint gating**: only the token's issuer may mint.
//! - **Pull transfers** (`transfer_from`) spend an allowance the holder granted
//!   the spender beforehand. This is how the ledger pulls deposits.
//! - **Supply tracking**: supply and balances are updated together and every
//!   addition is overflow-checked.

pub mod erc20;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Address, Wei};

pub use erc20::Erc20Book;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The referenced token does not exist.
    #[error("token not found: {0}")]
    TokenNotFound(Address),

    /// A token is already registered at this address.
    #[error("token already registered: {0}")]
    DuplicateToken(Address),

    /// A token with this symbol already exists.
    #[error("duplicate symbol: a token with symbol '{0}' already exists")]
    DuplicateSymbol(String),

    /// The caller is not the issuer of this token.
    #[error("unauthorized: only the issuer can mint this token")]
    UnauthorizedMint,

    /// Transfers to or from the null address are not allowed.
    #[error("transfer involving the zero address")]
    ZeroAddress,

    /// A supply overflow would occur.
    #[error("supply overflow: minting {amount} would exceed u128::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: Wei,
    },

    /// The holder does not have enough tokens.
    #[error("insufficient balance: {holder} has {balance}, needs {amount}")]
    InsufficientBalance {
        /// Holder being debited.
        holder: Address,
        /// Holder's balance.
        balance: Wei,
        /// Amount requested.
        amount: Wei,
    },

    /// The spender's allowance is too small.
    #[error("insufficient allowance: {owner} allows {spender} {allowed}, needs {amount}")]
    InsufficientAllowance {
        /// Token holder.
        owner: Address,
        /// Party pulling the tokens.
        spender: Address,
        /// Current allowance.
        allowed: Wei,
        /// Amount requested.
        amount: Wei,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata of a registered token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token address.
    pub address: Address,
    /// Human-readable name, e.g. "USD Coin".
    pub name: String,
    /// Ticker symbol, unique across the bank (stored upper-case).
    pub symbol: String,
    /// Display decimals. Arithmetic never uses it.
    pub decimals: u8,
    /// The only address allowed to mint.
    pub issuer: Address,
}

#[derive(Debug, Clone)]
struct TokenEntry {
    info: TokenInfo,
    book: Erc20Book,
}

/// Registry of ordinary tokens and their balances.
#[derive(Debug, Clone, Default)]
pub struct TokenBank {
    tokens: BTreeMap<Address, TokenEntry>,
    symbol_index: BTreeMap<String, Address>,
}

impl TokenBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token at `address`.
    ///
    /// # Errors
    ///
    /// [`TokenError::DuplicateToken`] or [`TokenError::DuplicateSymbol`].
    pub fn register(
        &mut self,
        address: Address,
        name: &str,
        symbol: &str,
        decimals: u8,
        issuer: Address,
    ) -> Result<(), TokenError> {
        if self.tokens.contains_key(&address) {
            return Err(TokenError::DuplicateToken(address));
        }
        let symbol_upper = symbol.to_uppercase();
        if self.symbol_index.contains_key(&symbol_upper) {
            return Err(TokenError::DuplicateSymbol(symbol.to_string()));
        }
        let info = TokenInfo {
            address,
            name: name.to_string(),
            symbol: symbol_upper.clone(),
            decimals,
            issuer,
        };
        self.tokens.insert(
            address,
            TokenEntry {
                info,
                book: Erc20Book::new(),
            },
        );
        self.symbol_index.insert(symbol_upper, address);
        Ok(())
    }

    /// Returns `true` if a token is registered at `token`.
    pub fn contains(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    /// Token metadata.
    pub fn info(&self, token: &Address) -> Option<&TokenInfo> {
        self.tokens.get(token).map(|e| &e.info)
    }

    /// Resolves a symbol (case-insensitive) to the token address.
    pub fn by_symbol(&self, symbol: &str) -> Option<Address> {
        self.symbol_index.get(&symbol.to_uppercase()).copied()
    }

    /// Mints `amount` of `token` to `to`. `caller` must be the issuer.
    pub fn mint(
        &mut self,
        token: &Address,
        caller: &Address,
        to: &Address,
        amount: Wei,
    ) -> Result<(), TokenError> {
        let entry = self.entry_mut(token)?;
        if entry.info.issuer != *caller {
            return Err(TokenError::UnauthorizedMint);
        }
        entry.book.mint(to, amount)
    }

    /// Balance of `holder` in `token`, 0 for unknown tokens.
    pub fn balance_of(&self, token: &Address, holder: &Address) -> Wei {
        self.tokens
            .get(token)
            .map(|e| e.book.balance_of(holder))
            .unwrap_or(0)
    }

    /// Total supply of `token`, 0 for unknown tokens.
    pub fn total_supply(&self, token: &Address) -> Wei {
        self.tokens
            .get(token)
            .map(|e| e.book.total_supply())
            .unwrap_or(0)
    }

    /// Allowance `owner` granted `spender` in `token`.
    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Wei {
        self.tokens
            .get(token)
            .map(|e| e.book.allowance(owner, spender))
            .unwrap_or(0)
    }

    /// `caller` sends `amount` of its own `token` to `to`.
    pub fn transfer(
        &mut self,
        token: &Address,
        caller: &Address,
        to: &Address,
        amount: Wei,
    ) -> Result<(), TokenError> {
        self.entry_mut(token)?.book.transfer(caller, to, amount)
    }

    /// `caller` pulls `amount` of `from`'s `token` to `to`, spending the
    /// allowance `from` granted `caller`.
    pub fn transfer_from(
        &mut self,
        token: &Address,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: Wei,
    ) -> Result<(), TokenError> {
        let book = &mut self.entry_mut(token)?.book;
        book.spend_allowance(from, caller, amount)?;
        book.transfer(from, to, amount)
    }

    /// `caller` sets the allowance of `spender` over its `token`.
    pub fn approve(
        &mut self,
        token: &Address,
        caller: &Address,
        spender: &Address,
        amount: Wei,
    ) -> Result<(), TokenError> {
        self.entry_mut(token)?.book.approve(caller, spender, amount);
        Ok(())
    }

    fn entry_mut(&mut self, token: &Address) -> Result<&mut TokenEntry, TokenError> {
        self.tokens
            .get_mut(token)
            .ok_or(TokenError::TokenNotFound(*token))
    }
}
