//! # Margin Ledger Store
//!
//! The ledger owns every signed per-account-per-market balance, the market
//! registry and the operator allow-lists. It is deliberately dumb: it knows
//! how to read, update and check balances, and how to resolve the amount an
//! action refers to. Sequencing actions and moving tokens in and out is the
//! job of whoever drives `operate` (see the contracts crate), because those
//! steps call back into token contracts and vault factories.
//!
//! ## Invariants
//!
//! 1. Market ids are dense and start at 0.
//! 2. A market's token backs exactly one market.
//! 3. A market with `allows_borrowing == false` never ends an operation with
//!    a negative balance ([`MarginLedger::verify_borrowing_allowed`]).
//!    Isolation-mode markets are expected to be registered that way; vault
//!    factories refuse to initialize otherwise.

pub mod action;
pub mod balance_check;
pub mod error;
pub mod market;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::types::{to_signed, Account, Address, AssetAmount, MarketId, SignedWei, Wei};

pub use action::Action;
pub use balance_check::BalanceCheckFlag;
pub use error::LedgerError;
pub use market::Market;

/// In-memory ledger state.
#[derive(Debug, Clone)]
pub struct MarginLedger {
    /// Address the ledger acts under when it moves tokens.
    address: Address,
    markets: Vec<Market>,
    token_to_market: BTreeMap<Address, MarketId>,
    balances: BTreeMap<(Account, MarketId), SignedWei>,
    global_operators: BTreeSet<Address>,
    /// `(owner, operator)` pairs approved by the owner.
    local_operators: BTreeSet<(Address, Address)>,
}

impl MarginLedger {
    /// Creates an empty ledger acting under `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            markets: Vec::new(),
            token_to_market: BTreeMap::new(),
            balances: BTreeMap::new(),
            global_operators: BTreeSet::new(),
            local_operators: BTreeSet::new(),
        }
    }

    /// The ledger's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    // -----------------------------------------------------------------------
    // Market registry
    // -----------------------------------------------------------------------

    /// Registers a market and returns its id.
    pub fn add_market(
        &mut self,
        token: Address,
        is_isolation_mode: bool,
        allows_borrowing: bool,
    ) -> Result<MarketId, LedgerError> {
        if self.token_to_market.contains_key(&token) {
            return Err(LedgerError::DuplicateMarketToken(token));
        }
        let id = self.markets.len() as MarketId;
        self.markets.push(Market {
            id,
            token,
            is_isolation_mode,
            allows_borrowing,
        });
        self.token_to_market.insert(token, id);
        debug!(market_id = id, %token, is_isolation_mode, "market added");
        Ok(id)
    }

    /// Enables or disables borrowing for a market.
    pub fn set_allows_borrowing(&mut self, market: MarketId, allows: bool) -> Result<(), LedgerError> {
        let entry = self
            .markets
            .get_mut(market as usize)
            .ok_or(LedgerError::UnknownMarket(market))?;
        entry.allows_borrowing = allows;
        Ok(())
    }

    /// Returns `true` if `market` is registered.
    pub fn is_market(&self, market: MarketId) -> bool {
        (market as usize) < self.markets.len()
    }

    /// Market metadata.
    pub fn market(&self, market: MarketId) -> Result<&Market, LedgerError> {
        self.markets
            .get(market as usize)
            .ok_or(LedgerError::UnknownMarket(market))
    }

    /// The token a market settles in.
    pub fn market_token(&self, market: MarketId) -> Result<Address, LedgerError> {
        self.market(market).map(|m| m.token)
    }

    /// The market a token backs, if any.
    pub fn market_by_token(&self, token: &Address) -> Option<MarketId> {
        self.token_to_market.get(token).copied()
    }

    /// Number of registered markets.
    pub fn num_markets(&self) -> usize {
        self.markets.len()
    }

    /// All markets in id order.
    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    /// Adds or removes a global operator.
    pub fn set_global_operator(&mut self, operator: Address, approved: bool) {
        if approved {
            self.global_operators.insert(operator);
        } else {
            self.global_operators.remove(&operator);
        }
    }

    /// Returns `true` if `operator` may act for every account.
    pub fn is_global_operator(&self, operator: &Address) -> bool {
        self.global_operators.contains(operator)
    }

    /// `owner` approves or revokes `operator`.
    pub fn set_operator(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.local_operators.insert((owner, operator));
        } else {
            self.local_operators.remove(&(owner, operator));
        }
    }

    /// Returns `true` if `owner` approved `operator`.
    pub fn is_local_operator(&self, owner: &Address, operator: &Address) -> bool {
        self.local_operators.contains(&(*owner, *operator))
    }

    /// Returns `true` if `caller` may act on `owner`'s accounts.
    pub fn is_operator_for(&self, owner: &Address, caller: &Address) -> bool {
        owner == caller || self.is_local_operator(owner, caller) || self.is_global_operator(caller)
    }

    /// Fails with [`LedgerError::Unauthorized`] unless `caller` may act on
    /// `owner`'s accounts.
    pub fn require_operator(&self, owner: &Address, caller: &Address) -> Result<(), LedgerError> {
        if self.is_operator_for(owner, caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                caller: *caller,
                owner: *owner,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Balances
    // -----------------------------------------------------------------------

    /// Signed balance of `account` in `market`.
    pub fn get_account_balance(&self, account: &Account, market: MarketId) -> SignedWei {
        self.balances.get(&(*account, market)).copied().unwrap_or(0)
    }

    /// Adds `delta` to the balance of `account` in `market`.
    pub fn apply_delta(
        &mut self,
        account: &Account,
        market: MarketId,
        delta: SignedWei,
    ) -> Result<SignedWei, LedgerError> {
        self.market(market)?;
        let current = self.get_account_balance(account, market);
        let updated = current
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow {
                account: *account,
                market,
            })?;
        if updated == 0 {
            self.balances.remove(&(*account, market));
        } else {
            self.balances.insert((*account, market), updated);
        }
        Ok(updated)
    }

    /// Credits `amount` to `account`.
    pub fn credit(
        &mut self,
        account: &Account,
        market: MarketId,
        amount: Wei,
    ) -> Result<SignedWei, LedgerError> {
        let delta = to_signed(amount).ok_or(LedgerError::AmountOverflow(amount))?;
        self.apply_delta(account, market, delta)
    }

    /// Debits `amount` from `account`. The balance may go negative; borrowing
    /// rules are enforced when the operation finishes.
    pub fn debit(
        &mut self,
        account: &Account,
        market: MarketId,
        amount: Wei,
    ) -> Result<SignedWei, LedgerError> {
        let delta = to_signed(amount).ok_or(LedgerError::AmountOverflow(amount))?;
        self.apply_delta(account, market, -delta)
    }

    /// Resolves an [`AssetAmount`] debited from `account` in `market`.
    ///
    /// `All` means the whole positive balance; `LastOutput` needs the output
    /// of an earlier trade in the same operation. The result is never zero.
    pub fn resolve_amount(
        &self,
        account: &Account,
        market: MarketId,
        amount: AssetAmount,
        last_output: Option<Wei>,
    ) -> Result<Wei, LedgerError> {
        let resolved = match amount {
            AssetAmount::Wei(value) => value,
            AssetAmount::All => {
                let balance = self.get_account_balance(account, market);
                if balance <= 0 {
                    return Err(LedgerError::NoPositiveBalance {
                        account: *account,
                        market,
                    });
                }
                balance as Wei
            }
            AssetAmount::LastOutput => last_output.ok_or(LedgerError::NoPreviousOutput)?,
        };
        if resolved == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        Ok(resolved)
    }

    /// Fails with [`LedgerError::AccountCannotGoNegative`] if `account` holds
    /// a negative balance of `market`.
    pub fn verify_non_negative(&self, account: &Account, market: MarketId) -> Result<(), LedgerError> {
        let balance = self.get_account_balance(account, market);
        if balance < 0 {
            return Err(LedgerError::AccountCannotGoNegative {
                account: *account,
                market,
                balance,
            });
        }
        Ok(())
    }

    /// Fails if any of `accounts` holds a negative balance in a market that
    /// does not allow borrowing.
    pub fn verify_borrowing_allowed(&self, accounts: &[Account]) -> Result<(), LedgerError> {
        for account in accounts {
            for market in &self.markets {
                if market.allows_borrowing {
                    continue;
                }
                let balance = self.get_account_balance(account, market.id);
                if balance < 0 {
                    return Err(LedgerError::BorrowingNotAllowed {
                        account: *account,
                        market: market.id,
                        balance,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every non-zero balance, ordered by account then market.
    pub fn balances(&self) -> impl Iterator<Item = (&Account, MarketId, SignedWei)> {
        self.balances.iter().map(|((a, m), b)| (a, *m, *b))
    }
}
