use thiserror::Error;

use crate::token::TokenError;
use crate::types::{Account, Address, MarketId, SignedWei, Wei};

/// Errors raised by the ledger store and its operate engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No market with this id is registered.
    #[error("unknown market: {0}")]
    UnknownMarket(MarketId),

    /// Another market already uses this token.
    #[error("token {0} already backs a market")]
    DuplicateMarketToken(Address),

    /// The caller may not act on behalf of the account owner.
    #[error("unauthorized: {caller} is not an operator for {owner}")]
    Unauthorized {
        /// The address that issued the operation.
        caller: Address,
        /// Owner of the account it tried to touch.
        owner: Address,
    },

    /// An action refers to an account index outside the accounts list.
    #[error("invalid account index {index} (operation has {len} accounts)")]
    InvalidAccountIndex {
        /// Offending index.
        index: usize,
        /// Number of accounts supplied.
        len: usize,
    },

    /// The same account appears twice in an operation's accounts list.
    #[error("duplicate account in operation: {0}")]
    DuplicateAccount(Account),

    /// An action resolved to a zero amount.
    #[error("action amount must be greater than zero")]
    ZeroAmount,

    /// `All` was requested but the account has nothing to give.
    #[error("account {account} has no positive balance in market {market}")]
    NoPositiveBalance {
        /// Account being debited.
        account: Account,
        /// Market being debited.
        market: MarketId,
    },

    /// `LastOutput` was requested before any trade produced output.
    #[error("no previous trade output to spend")]
    NoPreviousOutput,

    /// The amount does not fit in a signed balance.
    #[error("amount {0} overflows the balance range")]
    AmountOverflow(Wei),

    /// A balance update overflowed.
    #[error("balance overflow for {account} in market {market}")]
    BalanceOverflow {
        /// Account being updated.
        account: Account,
        /// Market being updated.
        market: MarketId,
    },

    /// A market that does not allow borrowing ended with a negative balance.
    #[error("market does not allow borrowing: {account} would hold {balance} of market {market}")]
    BorrowingNotAllowed {
        /// Account with the negative balance.
        account: Account,
        /// Market that forbids borrowing.
        market: MarketId,
        /// The offending balance.
        balance: SignedWei,
    },

    /// A balance check flag found a negative balance.
    #[error("account cannot go negative: {account} holds {balance} of market {market}")]
    AccountCannotGoNegative {
        /// Account that was checked.
        account: Account,
        /// Market that was checked.
        market: MarketId,
        /// The offending balance.
        balance: SignedWei,
    },

    /// No exchange wrapper, auto trader or callee is registered here.
    #[error("no ledger counterparty registered at {0}")]
    UnknownCounterparty(Address),

    /// The auto trader is not approved by the maker account owner.
    #[error("unpermissioned trade: {trader} is not approved by maker {maker}")]
    UnpermissionedTrade {
        /// Auto trader.
        trader: Address,
        /// Maker account owner.
        maker: Address,
    },

    /// The input and output markets of a trade are the same.
    #[error("trade input and output market are both {0}")]
    SameMarketTrade(MarketId),

    /// A token movement failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}
