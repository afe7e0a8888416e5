//! # Settlement Errors
//!
//! Every module owns a `thiserror` enum for its own failure modes. They are
//! folded into [`SettlementError`], the single error type returned by the
//! public surface of [`crate::MarginSystem`], so callers can `?` across
//! module boundaries and still match on the precise cause.
//!
//! [`ErrorKind`] gives a coarse classification that the node uses for
//! logging and metrics labels.

use margin_protocol::ledger::LedgerError;
use margin_protocol::token::TokenError;
use margin_protocol::{Address, Wei};
use thiserror::Error;

use crate::borrow_position::BorrowPositionError;
use crate::expiry::ExpiryError;
use crate::generic_trader::PathError;
use crate::isolation::{FactoryError, VaultError};
use crate::reentrancy::ReentrantCall;
use crate::traders::TraderError;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller is not allowed to do this.
    Authorization,
    /// The request is fine but the current state forbids it.
    State,
    /// The request itself is malformed.
    Validation,
    /// An accounting invariant would be broken.
    Invariant,
}

impl ErrorKind {
    /// Lowercase label, used as a metrics label value.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Validation => "validation",
            ErrorKind::Invariant => "invariant",
        }
    }
}

/// Errors returned by the settlement layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Ledger store or operate engine failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Token bank failure.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Vault factory or transfer queue failure.
    #[error(transparent)]
    Factory(#[from] FactoryError),

    /// Vault proxy failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Trade path validation failure.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Liquidity source or converter failure.
    #[error(transparent)]
    Trader(#[from] TraderError),

    /// Expiry collaborator failure.
    #[error(transparent)]
    Expiry(#[from] ExpiryError),

    /// Borrow-position proxy failure.
    #[error(transparent)]
    BorrowPosition(#[from] BorrowPositionError),

    /// A guarded entry point was re-entered while already executing.
    #[error("reentrancy: guarded entry point called while already executing")]
    Reentrancy,

    /// The swap produced less than the caller's minimum.
    #[error("insufficient output amount: expected at least {min_output}, got {actual}")]
    InsufficientOutputAmount {
        /// Minimum requested by the caller.
        min_output: Wei,
        /// What the path actually produced.
        actual: Wei,
    },

    /// The caller acts for an account owner without being its operator.
    #[error("{caller} is not an operator for account owner {owner}")]
    NotOperator {
        /// Address that issued the call.
        caller: Address,
        /// Owner of the targeted account.
        owner: Address,
    },

    /// A governance setter was called by someone else.
    #[error("only governance may call this, not {0}")]
    OnlyGovernance(Address),
}

impl SettlementError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Ledger(e) => ledger_kind(e),
            SettlementError::Token(e) => token_kind(e),
            SettlementError::Factory(e) => e.kind(),
            SettlementError::Vault(e) => e.kind(),
            SettlementError::Path(_) => ErrorKind::Validation,
            SettlementError::Trader(e) => e.kind(),
            SettlementError::Expiry(_) => ErrorKind::Validation,
            SettlementError::BorrowPosition(_) => ErrorKind::Authorization,
            SettlementError::Reentrancy => ErrorKind::State,
            SettlementError::InsufficientOutputAmount { .. } => ErrorKind::Invariant,
            SettlementError::NotOperator { .. } | SettlementError::OnlyGovernance(_) => {
                ErrorKind::Authorization
            }
        }
    }
}

impl From<ReentrantCall> for SettlementError {
    fn from(_: ReentrantCall) -> Self {
        SettlementError::Reentrancy
    }
}

fn ledger_kind(err: &LedgerError) -> ErrorKind {
    match err {
        LedgerError::Unauthorized { .. } | LedgerError::UnpermissionedTrade { .. } => {
            ErrorKind::Authorization
        }
        LedgerError::BorrowingNotAllowed { .. }
        | LedgerError::AccountCannotGoNegative { .. }
        | LedgerError::BalanceOverflow { .. } => ErrorKind::Invariant,
        LedgerError::Token(e) => token_kind(e),
        _ => ErrorKind::Validation,
    }
}

fn token_kind(err: &TokenError) -> ErrorKind {
    match err {
        TokenError::UnauthorizedMint => ErrorKind::Authorization,
        TokenError::InsufficientBalance { .. } | TokenError::InsufficientAllowance { .. } => {
            ErrorKind::State
        }
        _ => ErrorKind::Validation,
    }
}
