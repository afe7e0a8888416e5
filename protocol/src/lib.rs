// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Margin Protocol: Core Library
//!
//! Primitives and the reference ledger for a margin-trading settlement layer
//! that supports isolation-mode ("wrapped") assets. Everything that is shared
//! between the vault factories, the generic trader and the tooling lives here.
//!
//! ## Architecture
//!
//! - **types**: addresses, accounts, amounts and sentinels.
//! - **crypto**: BLAKE3/SHA-256 and deterministic address derivation.
//! - **token**: ERC20-style balance books and the wallet-level token bank.
//! - **ledger**: markets, signed balances, operators and ledger actions.
//! - **config**: protocol constants and [`config::SystemConfig`].
//!
//! ## Design Philosophy
//!
//! 1. All monetary arithmetic is checked. Wrapping arithmetic and money do
//!    not mix.
//! 2. State is plain data. Atomicity is the caller's job, and cloning the
//!    state is cheap enough to make it easy.
//! 3. Every public error says exactly which rule was broken.

pub mod config;
pub mod crypto;
pub mod ledger;
pub mod token;
pub mod types;

pub use types::{Account, AccountNumber, Address, AssetAmount, MarketId, SignedWei, Timestamp, Wei};
