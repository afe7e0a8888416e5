//! Vault implementations.
//!
//! [`VaultImplementation`] is the behaviour a vault proxy forwards to. The
//! trait's provided methods are the standard behaviour; an implementation
//! overrides only what it changes. Implementations are registered in the
//! system's implementation table and selected per factory, so a factory
//! swapping its implementation changes the behaviour of every existing
//! vault on its next call.
//!
//! Every method receives the proxy it runs for. Ownership and factory checks
//! have already been done by the proxy layer when a method is reached.

use std::fmt;

use margin_protocol::ledger::BalanceCheckFlag;
use margin_protocol::{AccountNumber, Address, MarketId, Wei};

use super::{FactoryError, VaultProxy};
use crate::error::SettlementError;
use crate::generic_trader::{ModifyPositionParams, SwapParams, SwapReceipt};
use crate::MarginSystem;

/// Behaviour behind a vault proxy.
pub trait VaultImplementation: fmt::Debug + Send + Sync {
    /// Human-readable implementation name, for logs.
    fn name(&self) -> &str;

    /// Pulls `amount` of underlying from `source` into the vault. Reached
    /// only from the factory's share hook.
    fn execute_deposit_into_vault(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        source: Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let underlying = system.factory(&vault.factory())?.underlying_token();
        let address = vault.address();
        system
            .tokens_mut()
            .transfer_from(&underlying, &address, &source, &address, amount)?;
        Ok(())
    }

    /// Sends `amount` of underlying from the vault to `recipient`. Reached
    /// only from the factory's share hook.
    fn execute_withdrawal_from_vault(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        recipient: Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let underlying = system.factory(&vault.factory())?.underlying_token();
        system
            .tokens_mut()
            .transfer(&underlying, &vault.address(), &recipient, amount)?;
        Ok(())
    }

    /// Moves `amount` of the owner's underlying into the vault and credits
    /// the vault's ledger account `to_account_number`.
    fn deposit_into_vault(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        system.deposit_into_dolomite_margin(vault.address(), vault.factory(), to_account_number, amount)
    }

    /// Debits the vault's ledger account and sends underlying to the owner.
    fn withdraw_from_vault(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        from_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        system.withdraw_from_dolomite_margin(
            vault.address(),
            vault.factory(),
            from_account_number,
            amount,
        )
    }

    /// Deposits an ordinary market's token from the owner's wallet into the
    /// vault's ledger account.
    fn deposit_other_token_into_dolomite_margin(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        to_account_number: AccountNumber,
        market_id: MarketId,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        system.deposit_other_token_into_dolomite_margin_for_vault_owner(
            vault.address(),
            vault.factory(),
            to_account_number,
            market_id,
            amount,
        )
    }

    /// Moves vault shares from one of the vault's accounts into a borrow
    /// position.
    fn open_borrow_position(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        from_account_number: AccountNumber,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let market = system.factory(&vault.factory())?.market_id();
        system.open_borrow_position(
            vault.address(),
            from_account_number,
            to_account_number,
            market,
            amount,
            BalanceCheckFlag::From,
        )
    }

    /// Moves every vault share out of a borrow position.
    fn close_borrow_position_with_underlying_vault_token(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        borrow_account_number: AccountNumber,
        to_account_number: AccountNumber,
    ) -> Result<(), SettlementError> {
        let market = system.factory(&vault.factory())?.market_id();
        system.close_borrow_position(
            vault.address(),
            borrow_account_number,
            to_account_number,
            &[market],
        )
    }

    /// Moves every positive balance of `market_ids` out of a borrow
    /// position. The vault's own market is refused here.
    fn close_borrow_position_with_other_tokens(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        borrow_account_number: AccountNumber,
        to_account_number: AccountNumber,
        market_ids: &[MarketId],
    ) -> Result<(), SettlementError> {
        let own_market = system.factory(&vault.factory())?.market_id();
        if market_ids.contains(&own_market) {
            return Err(FactoryError::InvalidMarket(own_market).into());
        }
        system.close_borrow_position(
            vault.address(),
            borrow_account_number,
            to_account_number,
            market_ids,
        )
    }

    fn swap_exact_input_for_output(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        params: SwapParams,
    ) -> Result<SwapReceipt, SettlementError> {
        system.swap_exact_input_for_output(vault.address(), params)
    }

    fn swap_exact_input_for_output_and_modify_position(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        params: ModifyPositionParams,
    ) -> Result<SwapReceipt, SettlementError> {
        system.swap_exact_input_for_output_and_modify_position(vault.address(), params)
    }
}

/// The stock vault: every method uses the standard behaviour.
#[derive(Debug, Clone)]
pub struct StandardVault {
    name: String,
}

impl StandardVault {
    pub fn new() -> Self {
        Self::named("standard-vault-v1")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for StandardVault {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultImplementation for StandardVault {
    fn name(&self) -> &str {
        &self.name
    }
}
