//! # Vault Factory
//!
//! One factory per isolation-mode market. The factory is three things at
//! once:
//!
//! - the **registry** of per-owner vault proxies, with a one-to-one,
//!   write-once mapping between owners and vaults;
//! - the **share token** the ledger sees for the market. Shares are minted
//!   to the ledger when underlying enters a vault and burned when it leaves,
//!   so the share supply always equals the underlying held by all vaults;
//! - the owner of the **transfer queue** that gates every share movement.
//!
//! This type only holds state and answers questions about it. Entry points
//! that also touch the ledger, the token bank or a vault live on
//! [`crate::MarginSystem`] (see `isolation::ops`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use margin_protocol::crypto::{derive_address, owner_salt, vault_proxy_code_hash};
use margin_protocol::token::{Erc20Book, TokenError};
use margin_protocol::{Address, MarketId, Wei};

use super::queue::{QueuedTransfer, TransferQueue};
use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a vault factory and its transfer queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    /// No factory is registered at this address.
    #[error("unknown vault factory: {0}")]
    UnknownFactory(Address),

    /// `initialize` was called twice.
    #[error("factory already initialized")]
    AlreadyInitialized,

    /// The factory must be initialized first.
    #[error("factory not initialized")]
    NotInitialized,

    /// An isolation-mode market must not allow borrowing.
    #[error("isolation market {0} allows borrowing")]
    MarketAllowsBorrowing(MarketId),

    /// A null address was supplied where a participant is required.
    #[error("invalid {0}: zero address")]
    ZeroAddress(&'static str),

    /// The owner already has a vault in this factory.
    #[error("vault already exists for {0}")]
    VaultAlreadyExists(Address),

    /// The address is not a vault of this factory.
    #[error("invalid vault: {0}")]
    InvalidVault(Address),

    /// Only a trusted converter or the vault itself may enqueue.
    #[error("caller {0} is not a trusted converter or the vault")]
    OnlyConverterOrVault(Address),

    /// Only one of this factory's vaults may call.
    #[error("caller {0} is not a vault")]
    OnlyVault(Address),

    /// Only a trusted converter may call.
    #[error("caller {0} is not a trusted token converter")]
    OnlyConverter(Address),

    /// Share movements must be issued by the ledger.
    #[error("caller {0} is not the ledger")]
    OnlyLedger(Address),

    /// Share movement from the null address.
    #[error("transfer from the zero address")]
    TransferFromZeroAddress,

    /// Share movement to the null address.
    #[error("transfer to the zero address")]
    TransferToZeroAddress,

    /// Neither side of the share movement is the ledger.
    #[error("from or to must be the ledger")]
    LedgerNotInvolved,

    /// Nothing is queued at the current cursor.
    #[error("invalid queued transfer at cursor {cursor}")]
    InvalidQueuedTransfer {
        /// The factory's current cursor.
        cursor: u64,
    },

    /// The entry at the current cursor was already consumed.
    #[error("transfer already executed at cursor {cursor}")]
    TransferAlreadyExecuted {
        /// The factory's current cursor.
        cursor: u64,
    },

    /// The movement's sender differs from the queued one.
    #[error("invalid from: expected {expected}, got {actual}")]
    InvalidFrom {
        /// Queued sender.
        expected: Address,
        /// Actual sender.
        actual: Address,
    },

    /// The movement's recipient differs from the queued one.
    #[error("invalid to: expected {expected}, got {actual}")]
    InvalidTo {
        /// Queued recipient.
        expected: Address,
        /// Actual recipient.
        actual: Address,
    },

    /// The movement's amount differs from the queued one.
    #[error("invalid amount: expected {expected}, got {actual}")]
    InvalidAmount {
        /// Queued amount.
        expected: Wei,
        /// Actual amount.
        actual: Wei,
    },

    /// Shares may only enter the ledger from the queued vault or a converter.
    #[error("invalid sender {0}: not the queued vault or a trusted converter")]
    InvalidSender(Address),

    /// Shares may only leave the ledger to a vault or a converter.
    #[error("invalid recipient {0}: not a vault or a trusted converter")]
    InvalidRecipient(Address),

    /// `get_queued_transfer_by_cursor` past the written range.
    #[error("no queued transfer at cursor {requested} (current cursor {current})")]
    CursorOutOfRange {
        /// Requested cursor.
        requested: u64,
        /// Current cursor.
        current: u64,
    },

    /// The market may not be deposited through this entry point.
    #[error("invalid market {0}")]
    InvalidMarket(MarketId),

    /// Share book failure.
    #[error("share token: {0}")]
    Shares(#[from] TokenError),
}

impl FactoryError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FactoryError::OnlyConverterOrVault(_)
            | FactoryError::OnlyVault(_)
            | FactoryError::OnlyConverter(_)
            | FactoryError::OnlyLedger(_) => ErrorKind::Authorization,
            FactoryError::AlreadyInitialized
            | FactoryError::NotInitialized
            | FactoryError::VaultAlreadyExists(_)
            | FactoryError::InvalidQueuedTransfer { .. }
            | FactoryError::TransferAlreadyExecuted { .. }
            | FactoryError::CursorOutOfRange { .. }
            | FactoryError::Shares(_) => ErrorKind::State,
            FactoryError::MarketAllowsBorrowing(_) => ErrorKind::Invariant,
            _ => ErrorKind::Validation,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which way an accepted share movement goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareFlow {
    /// The ledger pulls shares in: underlying enters the vault.
    IntoLedger,
    /// The ledger pushes shares out: underlying leaves the vault.
    OutOfLedger,
}

/// A queued transfer the token hook accepted, not yet marked executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedTransfer {
    /// Cursor of the entry.
    pub cursor: u64,
    /// The entry itself.
    pub transfer: QueuedTransfer,
    /// Direction of the movement.
    pub flow: ShareFlow,
}

/// State of one isolation-mode market's factory.
#[derive(Debug, Clone)]
pub struct VaultFactory {
    address: Address,
    market_id: MarketId,
    underlying_token: Address,
    initialized: bool,
    trusted_converters: BTreeSet<Address>,
    vault_implementation: Address,
    owner_to_vault: BTreeMap<Address, Address>,
    vault_to_owner: BTreeMap<Address, Address>,
    queue: TransferQueue,
    shares: Erc20Book,
}

impl VaultFactory {
    /// A fresh, uninitialized factory.
    pub fn new(
        address: Address,
        market_id: MarketId,
        underlying_token: Address,
        vault_implementation: Address,
    ) -> Self {
        Self {
            address,
            market_id,
            underlying_token,
            initialized: false,
            trusted_converters: BTreeSet::new(),
            vault_implementation,
            owner_to_vault: BTreeMap::new(),
            vault_to_owner: BTreeMap::new(),
            queue: TransferQueue::new(),
            shares: Erc20Book::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The factory's address, which is also the share token address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Ledger market the shares settle in.
    pub fn market_id(&self) -> MarketId {
        self.market_id
    }

    /// Token held by the vaults.
    pub fn underlying_token(&self) -> Address {
        self.underlying_token
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Implementation every vault proxy of this factory forwards to.
    pub fn vault_implementation(&self) -> Address {
        self.vault_implementation
    }

    pub fn is_token_converter_trusted(&self, converter: &Address) -> bool {
        self.trusted_converters.contains(converter)
    }

    pub fn trusted_converters(&self) -> impl Iterator<Item = &Address> {
        self.trusted_converters.iter()
    }

    /// Owner → vault.
    pub fn get_vault_by_account(&self, owner: &Address) -> Option<Address> {
        self.owner_to_vault.get(owner).copied()
    }

    /// Vault → owner.
    pub fn get_account_by_vault(&self, vault: &Address) -> Option<Address> {
        self.vault_to_owner.get(vault).copied()
    }

    pub fn is_vault(&self, address: &Address) -> bool {
        self.vault_to_owner.contains_key(address)
    }

    pub fn vault_count(&self) -> usize {
        self.vault_to_owner.len()
    }

    /// Deterministic vault address for `owner`, whether or not it exists.
    pub fn calculate_vault_by_account(&self, owner: &Address) -> Address {
        derive_address(&self.address, &owner_salt(owner), &vault_proxy_code_hash())
    }

    /// Current queue cursor.
    pub fn transfer_cursor(&self) -> u64 {
        self.queue.cursor()
    }

    /// The entry written at `cursor`.
    pub fn get_queued_transfer_by_cursor(
        &self,
        cursor: u64,
    ) -> Result<&QueuedTransfer, FactoryError> {
        self.queue.get(cursor).ok_or(FactoryError::CursorOutOfRange {
            requested: cursor,
            current: self.queue.cursor(),
        })
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> Wei {
        self.shares.total_supply()
    }

    /// Share balance of `holder`.
    pub fn share_balance_of(&self, holder: &Address) -> Wei {
        self.shares.balance_of(holder)
    }

    /// Share allowance `owner` granted `spender`.
    pub fn share_allowance(&self, owner: &Address, spender: &Address) -> Wei {
        self.shares.allowance(owner, spender)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// One-time setup. `market_allows_borrowing` is the ledger's flag for
    /// this factory's market.
    pub fn initialize(
        &mut self,
        initial_converters: &[Address],
        market_allows_borrowing: bool,
    ) -> Result<(), FactoryError> {
        if self.initialized {
            return Err(FactoryError::AlreadyInitialized);
        }
        if market_allows_borrowing {
            return Err(FactoryError::MarketAllowsBorrowing(self.market_id));
        }
        if initial_converters.iter().any(Address::is_zero) {
            return Err(FactoryError::ZeroAddress("token converter"));
        }
        self.trusted_converters.extend(initial_converters.iter().copied());
        self.initialized = true;
        Ok(())
    }

    pub fn set_is_token_converter_trusted(
        &mut self,
        converter: Address,
        trusted: bool,
    ) -> Result<(), FactoryError> {
        if converter.is_zero() {
            return Err(FactoryError::ZeroAddress("token converter"));
        }
        if trusted {
            self.trusted_converters.insert(converter);
        } else {
            self.trusted_converters.remove(&converter);
        }
        Ok(())
    }

    /// Swaps the implementation and returns the previous one.
    pub fn set_user_vault_implementation(
        &mut self,
        implementation: Address,
    ) -> Result<Address, FactoryError> {
        if implementation.is_zero() {
            return Err(FactoryError::ZeroAddress("vault implementation"));
        }
        Ok(std::mem::replace(&mut self.vault_implementation, implementation))
    }

    /// Records a vault for `owner` at its predicted address.
    pub fn register_vault(&mut self, owner: Address) -> Result<Address, FactoryError> {
        if owner.is_zero() {
            return Err(FactoryError::ZeroAddress("account"));
        }
        if !self.initialized {
            return Err(FactoryError::NotInitialized);
        }
        if self.owner_to_vault.contains_key(&owner) {
            return Err(FactoryError::VaultAlreadyExists(owner));
        }
        let vault = self.calculate_vault_by_account(&owner);
        self.owner_to_vault.insert(owner, vault);
        self.vault_to_owner.insert(vault, owner);
        Ok(vault)
    }

    // -----------------------------------------------------------------------
    // Transfer queue
    // -----------------------------------------------------------------------

    fn require_converter_or_vault(
        &self,
        caller: &Address,
        vault: &Address,
    ) -> Result<(), FactoryError> {
        if !self.is_token_converter_trusted(caller) && caller != vault {
            return Err(FactoryError::OnlyConverterOrVault(*caller));
        }
        if !self.is_vault(vault) {
            return Err(FactoryError::InvalidVault(*vault));
        }
        Ok(())
    }

    /// Announces that the ledger is about to pull `amount` shares from
    /// `caller`, and approves that exact pull.
    pub fn enqueue_transfer_into_ledger(
        &mut self,
        caller: Address,
        ledger: Address,
        vault: Address,
        amount: Wei,
    ) -> Result<u64, FactoryError> {
        self.require_converter_or_vault(&caller, &vault)?;
        let cursor = self
            .queue
            .enqueue(QueuedTransfer::new(caller, ledger, amount, vault));
        self.shares.approve(&caller, &ledger, amount);
        Ok(cursor)
    }

    /// Announces that the ledger is about to push `amount` shares to
    /// `caller`.
    pub fn enqueue_transfer_from_ledger(
        &mut self,
        caller: Address,
        ledger: Address,
        vault: Address,
        amount: Wei,
    ) -> Result<u64, FactoryError> {
        self.require_converter_or_vault(&caller, &vault)?;
        Ok(self
            .queue
            .enqueue(QueuedTransfer::new(ledger, caller, amount, vault)))
    }

    /// Runs every check of the share token hook against the entry at the
    /// current cursor without changing anything.
    pub fn accept_share_transfer(
        &self,
        caller: &Address,
        ledger: &Address,
        from: &Address,
        to: &Address,
        amount: Wei,
    ) -> Result<AcceptedTransfer, FactoryError> {
        if caller != ledger {
            return Err(FactoryError::OnlyLedger(*caller));
        }
        if from.is_zero() {
            return Err(FactoryError::TransferFromZeroAddress);
        }
        if to.is_zero() {
            return Err(FactoryError::TransferToZeroAddress);
        }
        if from != ledger && to != ledger {
            return Err(FactoryError::LedgerNotInvolved);
        }

        let cursor = self.queue.cursor();
        let queued = self
            .queue
            .current()
            .ok_or(FactoryError::InvalidQueuedTransfer { cursor })?;
        if queued.is_executed {
            return Err(FactoryError::TransferAlreadyExecuted { cursor });
        }
        if queued.from != *from {
            return Err(FactoryError::InvalidFrom {
                expected: queued.from,
                actual: *from,
            });
        }
        if queued.to != *to {
            return Err(FactoryError::InvalidTo {
                expected: queued.to,
                actual: *to,
            });
        }
        if queued.amount != amount {
            return Err(FactoryError::InvalidAmount {
                expected: queued.amount,
                actual: amount,
            });
        }

        let flow = if to == ledger {
            if *from != queued.vault && !self.is_token_converter_trusted(from) {
                return Err(FactoryError::InvalidSender(*from));
            }
            ShareFlow::IntoLedger
        } else {
            if !self.is_vault(to) && !self.is_token_converter_trusted(to) {
                return Err(FactoryError::InvalidRecipient(*to));
            }
            ShareFlow::OutOfLedger
        };

        Ok(AcceptedTransfer {
            cursor,
            transfer: queued.clone(),
            flow,
        })
    }

    /// Consumes the entry at the current cursor.
    pub fn mark_transfer_executed(&mut self) -> Result<(), FactoryError> {
        let cursor = self.queue.cursor();
        if !self.queue.mark_current_executed() {
            return Err(FactoryError::TransferAlreadyExecuted { cursor });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Share book
    // -----------------------------------------------------------------------

    /// Spends the allowance `owner` granted `spender`.
    pub fn spend_share_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: Wei,
    ) -> Result<(), FactoryError> {
        self.shares.spend_allowance(owner, spender, amount)?;
        Ok(())
    }

    pub fn mint_shares(&mut self, to: &Address, amount: Wei) -> Result<(), FactoryError> {
        self.shares.mint(to, amount)?;
        Ok(())
    }

    pub fn burn_shares(&mut self, from: &Address, amount: Wei) -> Result<(), FactoryError> {
        self.shares.burn(from, amount)?;
        Ok(())
    }
}
