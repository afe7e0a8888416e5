//! # Isolation Mode
//!
//! Wrapped assets that must be held in a per-owner vault instead of the
//! shared ledger.
//!
//! ```text
//! queue.rs  : the single-use, cursor-ordered transfer queue
//! factory.rs: vault registry, share token book and queue checks
//! proxy.rs  : per-owner vault identity and call gating
//! vault.rs  : the behaviour vault proxies forward to
//! ops.rs    : system entry points tying the above to the ledger
//! ```
//!
//! ## How a deposit moves
//!
//! ```text
//! owner ──deposit_into_vault──▶ proxy ──▶ implementation
//!                                            │
//!                factory.enqueue(vault → ledger, amount)
//!                ledger.operate(Deposit from vault)
//!                   └─▶ factory share hook: transfer_from(vault, ledger, amount)
//!                          ├─ match & consume the queued entry
//!                          ├─ vault pulls underlying from the owner
//!                          └─ mint shares to the ledger
//! ```

pub mod factory;
mod ops;
pub mod proxy;
pub mod queue;
pub mod vault;

pub use factory::{AcceptedTransfer, FactoryError, ShareFlow, VaultFactory};
pub use proxy::{VaultError, VaultProxy};
pub use queue::{QueuedTransfer, TransferQueue};
pub use vault::{StandardVault, VaultImplementation};
