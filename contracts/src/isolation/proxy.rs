//! Vault proxies.
//!
//! A proxy is the stable identity of a vault: its address, its factory and
//! its owner. It carries no behaviour of its own. Every call is forwarded to
//! whatever implementation the factory currently points at, looked up at
//! call time, so swapping the factory's implementation upgrades every
//! existing vault at once.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use margin_protocol::Address;

use crate::error::ErrorKind;

/// Errors raised by vault proxies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// No proxy exists at this address.
    #[error("not a vault: {0}")]
    NotAVault(Address),

    /// The proxy was called before `initialize`.
    #[error("not initialized: {0}")]
    NotInitialized(Address),

    /// `initialize` was called twice.
    #[error("already initialized")]
    AlreadyInitialized,

    /// The proxy does not live at the address predicted for the owner.
    #[error("invalid account: {owner} maps to {expected}, proxy is {actual}")]
    InvalidAccount {
        /// Owner passed to `initialize`.
        owner: Address,
        /// Address the factory predicts for the owner.
        expected: Address,
        /// The proxy's address.
        actual: Address,
    },

    /// Only the vault owner may call.
    #[error("only vault owner: {caller} is not {owner}")]
    OnlyOwner {
        /// Address that issued the call.
        caller: Address,
        /// The vault's owner.
        owner: Address,
    },

    /// Only the vault's factory may call.
    #[error("only vault factory: {caller} is not {factory}")]
    OnlyFactory {
        /// Address that issued the call.
        caller: Address,
        /// The vault's factory.
        factory: Address,
    },

    /// The factory points at an implementation nobody registered.
    #[error("unknown vault implementation: {0}")]
    UnknownImplementation(Address),
}

impl VaultError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::OnlyOwner { .. } | VaultError::OnlyFactory { .. } => {
                ErrorKind::Authorization
            }
            VaultError::NotInitialized(_) | VaultError::AlreadyInitialized => ErrorKind::State,
            _ => ErrorKind::Validation,
        }
    }
}

/// The per-owner vault record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultProxy {
    address: Address,
    factory: Address,
    owner: Option<Address>,
}

impl VaultProxy {
    /// A proxy deployed at `address` by `factory`, not yet bound to an owner.
    pub fn new(address: Address, factory: Address) -> Self {
        Self {
            address,
            factory,
            owner: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn is_initialized(&self) -> bool {
        self.owner.is_some()
    }

    /// The owner, once initialized.
    pub fn owner(&self) -> Result<Address, VaultError> {
        self.owner.ok_or(VaultError::NotInitialized(self.address))
    }

    /// Binds the proxy to `owner`. `predicted` is the factory's
    /// `calculate_vault_by_account(owner)`.
    pub fn initialize(&mut self, owner: Address, predicted: Address) -> Result<(), VaultError> {
        if self.owner.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }
        if predicted != self.address {
            return Err(VaultError::InvalidAccount {
                owner,
                expected: predicted,
                actual: self.address,
            });
        }
        self.owner = Some(owner);
        Ok(())
    }

    pub fn require_owner(&self, caller: &Address) -> Result<Address, VaultError> {
        let owner = self.owner()?;
        if *caller != owner {
            return Err(VaultError::OnlyOwner {
                caller: *caller,
                owner,
            });
        }
        Ok(owner)
    }

    pub fn require_factory(&self, caller: &Address) -> Result<(), VaultError> {
        self.owner()?;
        if *caller != self.factory {
            return Err(VaultError::OnlyFactory {
                caller: *caller,
                factory: self.factory,
            });
        }
        Ok(())
    }
}
