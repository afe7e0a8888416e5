//! # Margin Settlement Contracts
//!
//! Settlement logic that sits on top of the margin ledger in
//! `margin-protocol`. Isolation-mode markets hold their balances in per-owner
//! vaults, and every movement of a wrapped token into or out of the ledger
//! must be announced first:
//!
//! - **Isolation**: vault factories (one per isolation market) that issue
//!   vault shares, own the transfer queue and mint deterministic per-owner
//!   vault proxies, plus the vault implementations the proxies dispatch to.
//! - **Traders**: liquidity sources the ledger calls during `Sell` and
//!   `Trade` actions, and the wrapper/unwrapper token converters.
//! - **Generic Trader**: multi-leg swaps validated up front and settled as
//!   one ledger operation, with optional collateral movement and expiry.
//! - **Collaborators**: expiry book and borrow-position proxy.
//!
//! ## Execution Model
//!
//! [`MarginSystem`] owns all state. Every public entry point is atomic: when
//! it fails, the state it saw on entry is restored. Trader entry points are
//! additionally guarded against re-entry.

pub mod borrow_position;
pub mod error;
pub mod events;
pub mod expiry;
pub mod generic_trader;
pub mod isolation;
pub mod reentrancy;
pub mod system;
pub mod traders;

pub use error::{ErrorKind, SettlementError};
pub use system::MarginSystem;
