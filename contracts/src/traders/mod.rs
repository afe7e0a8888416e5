//! # Liquidity Sources & Converters
//!
//! The ledger's `Sell`, `Trade` and `Call` actions hand control to an
//! external component registered at an address:
//!
//! | Action | Trait               | Contract                                      |
//! |--------|---------------------|-----------------------------------------------|
//! | `Sell` | [`ExchangeWrapper`] | receives the input, approves the output       |
//! | `Trade`| [`AutoTrader`]      | prices a match against a maker account        |
//! | `Call` | [`LedgerCallee`]    | arbitrary callback with a resolved amount     |
//!
//! Token converters ([`TokenConverter`]) are exchange wrappers that move
//! value in or out of an isolation-mode market. They also answer which
//! tokens they accept and produce, which the path validator relies on.
//!
//! ```text
//! fixed_rate.rs: FixedRateExchange, FixedRateAutoTrader
//! converters.rs: IsolationModeWrapper, IsolationModeUnwrapper
//! ```

pub mod converters;
pub mod fixed_rate;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use margin_protocol::{Account, Address, MarketId, Wei};

use crate::error::{ErrorKind, SettlementError};
use crate::MarginSystem;

pub use converters::{IsolationModeUnwrapper, IsolationModeWrapper};
pub use fixed_rate::{FixedRateAutoTrader, FixedRateExchange};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by liquidity sources and converters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraderError {
    /// A rate with a zero denominator.
    #[error("invalid rate {numerator}/{denominator}")]
    InvalidRate {
        numerator: u128,
        denominator: u128,
    },

    /// Applying the rate overflowed.
    #[error("rate overflow converting {0}")]
    RateOverflow(Wei),

    /// The source has no rate for this token pair.
    #[error("unsupported pair {input} -> {output}")]
    UnsupportedTokenPair { input: Address, output: Address },

    /// The auto trader has no rate for this market pair.
    #[error("unsupported market pair {input} -> {output}")]
    UnsupportedMarketPair { input: MarketId, output: MarketId },

    /// The converter does not accept this input token.
    #[error("invalid input token {0}")]
    InvalidInputToken(Address),

    /// The converter does not produce this output token.
    #[error("invalid output token {0}")]
    InvalidOutputToken(Address),

    /// The account owner driving the conversion is not a vault of the
    /// converter's factory.
    #[error("invalid trade originator {0}: not a vault")]
    InvalidTradeOriginator(Address),

    /// The owner has no vault in the target factory.
    #[error("no vault for {owner} in factory {factory}")]
    NoVaultForOwner { factory: Address, owner: Address },

    /// The callee does not support `Call`.
    #[error("{0} does not accept ledger calls")]
    UnsupportedCall(Address),
}

impl TraderError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TraderError::InvalidTradeOriginator(_) => ErrorKind::Authorization,
            TraderError::RateOverflow(_) => ErrorKind::Invariant,
            _ => ErrorKind::Validation,
        }
    }
}

// ---------------------------------------------------------------------------
// Rate
// ---------------------------------------------------------------------------

/// A fixed `numerator / denominator` conversion rate, rounding down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub numerator: u128,
    pub denominator: u128,
}

impl Rate {
    pub fn new(numerator: u128, denominator: u128) -> Result<Self, TraderError> {
        if denominator == 0 {
            return Err(TraderError::InvalidRate {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// 1:1.
    pub const fn one() -> Self {
        Self {
            numerator: 1,
            denominator: 1,
        }
    }

    /// `amount * numerator / denominator`.
    pub fn apply(&self, amount: Wei) -> Result<Wei, TraderError> {
        if self.denominator == 0 {
            return Err(TraderError::InvalidRate {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        amount
            .checked_mul(self.numerator)
            .map(|scaled| scaled / self.denominator)
            .ok_or(TraderError::RateOverflow(amount))
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// What the ledger tells an exchange wrapper during a `Sell`. By the time
/// `exchange` runs, the wrapper already holds `input_amount` of
/// `input_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRequest {
    /// Owner of the account selling.
    pub trade_originator: Address,
    /// Who will pull the output (the ledger).
    pub receiver: Address,
    pub input_token: Address,
    pub output_token: Address,
    pub input_amount: Wei,
    pub data: Vec<u8>,
}

/// What the ledger asks an auto trader during a `Trade`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoTradeRequest {
    pub input_market: MarketId,
    pub output_market: MarketId,
    pub maker_account: Account,
    pub taker_account: Account,
    /// Amount of `input_market` the taker gives.
    pub input_amount: Wei,
    pub data: Vec<u8>,
}

/// What the ledger passes to a callee during a `Call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Address that issued the operation.
    pub sender: Address,
    pub account: Account,
    /// Market the amount was resolved against.
    pub market: MarketId,
    pub amount: Wei,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A liquidity source for `Sell` actions.
pub trait ExchangeWrapper: fmt::Debug + Send + Sync {
    /// Converts the input the wrapper now holds and makes the output
    /// pullable by `request.receiver`. Returns the output amount.
    fn exchange(
        &self,
        system: &mut MarginSystem,
        request: &ExchangeRequest,
    ) -> Result<Wei, SettlementError>;
}

/// A maker-side pricing contract for `Trade` actions.
pub trait AutoTrader: fmt::Debug + Send + Sync {
    /// Amount of `output_market` the maker gives for the taker's input.
    fn get_trade_cost(
        &self,
        system: &MarginSystem,
        request: &AutoTradeRequest,
    ) -> Result<Wei, SettlementError>;
}

/// Target of `Call` actions.
pub trait LedgerCallee: fmt::Debug + Send + Sync {
    fn call_function(
        &self,
        system: &mut MarginSystem,
        request: &CallRequest,
    ) -> Result<(), SettlementError>;
}

/// An exchange wrapper bound to one vault factory.
pub trait TokenConverter: ExchangeWrapper + LedgerCallee {
    /// The factory (isolation-mode market token) this converter serves.
    fn vault_factory(&self) -> Address;

    /// Whether the converter accepts `token` as input.
    fn is_valid_input_token(&self, token: &Address) -> bool;

    /// Whether the converter can produce `token`.
    fn is_valid_output_token(&self, token: &Address) -> bool;
}
