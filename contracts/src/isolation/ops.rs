//! System entry points for vault factories and vault proxies.

use std::sync::Arc;
use tracing::{debug, info, warn};

use margin_protocol::ledger::Action;
use margin_protocol::{Account, AccountNumber, Address, AssetAmount, MarketId, Wei};

use super::{FactoryError, QueuedTransfer, ShareFlow, VaultError, VaultImplementation, VaultProxy};
use crate::error::SettlementError;
use crate::events::Event;
use crate::generic_trader::{ModifyPositionParams, SwapParams, SwapReceipt};
use crate::MarginSystem;

impl MarginSystem {
    // -----------------------------------------------------------------------
    // Governance
    // -----------------------------------------------------------------------

    /// One-time factory setup with its first trusted converters.
    pub fn initialize_vault_factory(
        &mut self,
        caller: Address,
        factory: Address,
        initial_converters: &[Address],
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        let market = self.factory(&factory)?.market_id();
        let allows_borrowing = self.ledger.market(market)?.allows_borrowing;
        self.factory_mut(&factory)?
            .initialize(initial_converters, allows_borrowing)?;
        info!(factory = %factory, converters = initial_converters.len(), "vault factory initialized");
        self.emit(Event::Initialized {
            factory,
            converters: initial_converters.to_vec(),
        });
        Ok(())
    }

    pub fn set_is_token_converter_trusted(
        &mut self,
        caller: Address,
        factory: Address,
        converter: Address,
        trusted: bool,
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        self.factory_mut(&factory)?
            .set_is_token_converter_trusted(converter, trusted)?;
        info!(factory = %factory, converter = %converter, trusted, "token converter trust set");
        self.emit(Event::TokenConverterSet {
            factory,
            converter,
            trusted,
        });
        Ok(())
    }

    /// Points every vault of `factory` at a registered implementation.
    pub fn set_user_vault_implementation(
        &mut self,
        caller: Address,
        factory: Address,
        implementation: Address,
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        if !implementation.is_zero() && !self.implementations.contains_key(&implementation) {
            return Err(VaultError::UnknownImplementation(implementation).into());
        }
        let previous = self
            .factory_mut(&factory)?
            .set_user_vault_implementation(implementation)?;
        info!(
            factory = %factory,
            previous = %previous,
            implementation = %implementation,
            "user vault implementation set"
        );
        self.emit(Event::UserVaultImplementationSet {
            factory,
            previous,
            implementation,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Vault lifecycle
    // -----------------------------------------------------------------------

    /// The address `owner`'s vault has, or will have, in `factory`.
    pub fn calculate_vault_by_account(
        &self,
        factory: &Address,
        owner: &Address,
    ) -> Result<Address, SettlementError> {
        Ok(self.factory(factory)?.calculate_vault_by_account(owner))
    }

    /// Creates and initializes `owner`'s vault in `factory`.
    pub fn create_vault(
        &mut self,
        factory: Address,
        owner: Address,
    ) -> Result<Address, SettlementError> {
        self.atomically(|sys| {
            let vault = sys.factory_mut(&factory)?.register_vault(owner)?;
            let predicted = sys.factory(&factory)?.calculate_vault_by_account(&owner);
            let mut proxy = VaultProxy::new(vault, factory);
            proxy.initialize(owner, predicted)?;
            sys.vaults.insert(vault, proxy);
            sys.authorize_borrow_position_caller(vault, true);

            info!(factory = %factory, owner = %owner, vault = %vault, "vault created");
            sys.emit(Event::VaultCreated {
                factory,
                owner,
                vault,
            });
            Ok(vault)
        })
    }

    /// Creates `caller`'s vault and deposits `amount` of underlying from the
    /// caller's wallet into account `to_account_number`. The caller must
    /// have approved the predicted vault address beforehand.
    pub fn create_vault_and_deposit(
        &mut self,
        caller: Address,
        factory: Address,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<Address, SettlementError> {
        self.atomically(|sys| {
            let vault = sys.create_vault(factory, caller)?;
            sys.vault_deposit_into_vault(caller, vault, to_account_number, amount)?;
            Ok(vault)
        })
    }

    /// Re-running proxy initialization always fails once a vault exists.
    pub fn initialize_vault(&mut self, vault: Address, owner: Address) -> Result<(), SettlementError> {
        let predicted = {
            let proxy = self.vault(&vault)?;
            self.factory(&proxy.factory())?.calculate_vault_by_account(&owner)
        };
        let proxy = self
            .vaults
            .get_mut(&vault)
            .ok_or(VaultError::NotAVault(vault))?;
        proxy.initialize(owner, predicted)?;
        Ok(())
    }

    /// Copy of the queued transfer at `cursor`.
    pub fn get_queued_transfer_by_cursor(
        &self,
        factory: &Address,
        cursor: u64,
    ) -> Result<QueuedTransfer, SettlementError> {
        Ok(self
            .factory(factory)?
            .get_queued_transfer_by_cursor(cursor)?
            .clone())
    }

    // -----------------------------------------------------------------------
    // Transfer queue
    // -----------------------------------------------------------------------

    /// Announces a share pull by the ledger from `caller`.
    pub fn enqueue_transfer_into_dolomite_margin(
        &mut self,
        caller: Address,
        factory: Address,
        vault: Address,
        amount: Wei,
    ) -> Result<u64, SettlementError> {
        let ledger = self.ledger_address();
        let cursor = self
            .factory_mut(&factory)?
            .enqueue_transfer_into_ledger(caller, ledger, vault, amount)?;
        self.record_enqueue(factory, cursor);
        Ok(cursor)
    }

    /// Announces a share push by the ledger to `caller`.
    pub fn enqueue_transfer_from_dolomite_margin(
        &mut self,
        caller: Address,
        factory: Address,
        vault: Address,
        amount: Wei,
    ) -> Result<u64, SettlementError> {
        let ledger = self.ledger_address();
        let cursor = self
            .factory_mut(&factory)?
            .enqueue_transfer_from_ledger(caller, ledger, vault, amount)?;
        self.record_enqueue(factory, cursor);
        Ok(cursor)
    }

    fn record_enqueue(&mut self, factory: Address, cursor: u64) {
        let transfer = self
            .factories
            .get(&factory)
            .and_then(|f| f.get_queued_transfer_by_cursor(cursor).ok())
            .cloned();
        if let Some(transfer) = transfer {
            debug!(
                factory = %factory,
                cursor,
                from = %transfer.from,
                to = %transfer.to,
                amount = transfer.amount,
                "transfer queued"
            );
            self.emit(Event::TransferQueued {
                factory,
                cursor,
                transfer,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Share token hook
    // -----------------------------------------------------------------------

    /// Share token `transfer`: `caller` sends its own shares to `to`.
    pub fn transfer_vault_shares(
        &mut self,
        caller: Address,
        factory: Address,
        to: Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        self.atomically(|sys| sys.move_vault_shares(caller, factory, caller, to, amount, false))
    }

    /// Share token `transfer_from`: `caller` moves `from`'s shares to `to`.
    pub fn transfer_vault_shares_from(
        &mut self,
        caller: Address,
        factory: Address,
        from: Address,
        to: Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        self.atomically(|sys| sys.move_vault_shares(caller, factory, from, to, amount, true))
    }

    fn move_vault_shares(
        &mut self,
        caller: Address,
        factory_address: Address,
        from: Address,
        to: Address,
        amount: Wei,
        spend_allowance: bool,
    ) -> Result<(), SettlementError> {
        let ledger = self.ledger_address();
        let factory = self.factory_mut(&factory_address)?;
        let accepted = match factory.accept_share_transfer(&caller, &ledger, &from, &to, amount) {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(factory = %factory_address, from = %from, to = %to, amount, error = %err, "share transfer rejected");
                return Err(err.into());
            }
        };
        if spend_allowance {
            factory.spend_share_allowance(&from, &caller, amount)?;
        }
        factory.mark_transfer_executed()?;

        let vault = accepted.transfer.vault;
        match accepted.flow {
            ShareFlow::IntoLedger => {
                let source = factory.get_account_by_vault(&from).unwrap_or(from);
                self.vault_execute_deposit(factory_address, vault, source, amount)?;
                self.factory_mut(&factory_address)?
                    .mint_shares(&ledger, amount)?;
            }
            ShareFlow::OutOfLedger => {
                let recipient = factory.get_account_by_vault(&to).unwrap_or(to);
                self.vault_execute_withdrawal(factory_address, vault, recipient, amount)?;
                self.factory_mut(&factory_address)?
                    .burn_shares(&ledger, amount)?;
            }
        }

        info!(
            factory = %factory_address,
            cursor = accepted.cursor,
            vault = %vault,
            amount,
            flow = ?accepted.flow,
            "transfer executed"
        );
        self.emit(Event::TransferExecuted {
            factory: factory_address,
            cursor: accepted.cursor,
            from,
            to,
            amount,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Factory deposit / withdraw
    // -----------------------------------------------------------------------

    fn require_vault_of(&self, factory: &Address, caller: &Address) -> Result<MarketId, SettlementError> {
        let f = self.factory(factory)?;
        if !f.is_vault(caller) {
            return Err(FactoryError::OnlyVault(*caller).into());
        }
        Ok(f.market_id())
    }

    /// Vault only: deposits `amount` of the owner's underlying into the
    /// vault's account `to_account_number`.
    pub fn deposit_into_dolomite_margin(
        &mut self,
        caller: Address,
        factory: Address,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        self.atomically(|sys| {
            let market = sys.require_vault_of(&factory, &caller)?;
            sys.enqueue_transfer_into_dolomite_margin(caller, factory, caller, amount)?;
            sys.operate(
                factory,
                &[Account::new(caller, to_account_number)],
                &[Action::Deposit {
                    account: 0,
                    market,
                    amount,
                    from: caller,
                }],
            )?;
            Ok(())
        })
    }

    /// Converter only: deposits underlying the converter holds into
    /// `vault`'s account `vault_account_number`. The converter must have
    /// approved the vault for the underlying.
    pub fn deposit_into_dolomite_margin_from_token_converter(
        &mut self,
        caller: Address,
        factory: Address,
        vault: Address,
        vault_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        self.atomically(|sys| {
            let f = sys.factory(&factory)?;
            if !f.is_token_converter_trusted(&caller) {
                return Err(FactoryError::OnlyConverter(caller).into());
            }
            if !f.is_vault(&vault) {
                return Err(FactoryError::InvalidVault(vault).into());
            }
            let market = f.market_id();
            sys.enqueue_transfer_into_dolomite_margin(caller, factory, vault, amount)?;
            sys.operate(
                factory,
                &[Account::new(vault, vault_account_number)],
                &[Action::Deposit {
                    account: 0,
                    market,
                    amount,
                    from: caller,
                }],
            )?;
            Ok(())
        })
    }

    /// Vault only: pulls an ordinary market's token from the vault owner's
    /// wallet and deposits it into the vault's account. The owner must have
    /// approved the factory.
    pub fn deposit_other_token_into_dolomite_margin_for_vault_owner(
        &mut self,
        caller: Address,
        factory: Address,
        to_account_number: AccountNumber,
        market_id: MarketId,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        self.atomically(|sys| {
            let own_market = sys.require_vault_of(&factory, &caller)?;
            let market = sys.ledger.market(market_id)?;
            if market_id == own_market || market.is_isolation_mode {
                return Err(FactoryError::InvalidMarket(market_id).into());
            }
            let token = market.token;
            let owner = sys
                .factory(&factory)?
                .get_account_by_vault(&caller)
                .ok_or(FactoryError::InvalidVault(caller))?;
            let ledger = sys.ledger_address();

            sys.tokens
                .transfer_from(&token, &factory, &owner, &factory, amount)?;
            sys.tokens.approve(&token, &factory, &ledger, amount)?;
            sys.operate(
                factory,
                &[Account::new(caller, to_account_number)],
                &[Action::Deposit {
                    account: 0,
                    market: market_id,
                    amount,
                    from: factory,
                }],
            )?;
            Ok(())
        })
    }

    /// Vault only: withdraws `amount` from the vault's account and sends the
    /// underlying to the owner.
    pub fn withdraw_from_dolomite_margin(
        &mut self,
        caller: Address,
        factory: Address,
        from_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        self.atomically(|sys| {
            let market = sys.require_vault_of(&factory, &caller)?;
            sys.enqueue_transfer_from_dolomite_margin(caller, factory, caller, amount)?;
            sys.operate(
                factory,
                &[Account::new(caller, from_account_number)],
                &[Action::Withdraw {
                    account: 0,
                    market,
                    amount: AssetAmount::Wei(amount),
                    to: caller,
                }],
            )?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Vault proxy forwarding
    // -----------------------------------------------------------------------

    fn resolve_vault(
        &self,
        vault: &Address,
    ) -> Result<(VaultProxy, Arc<dyn VaultImplementation>), SettlementError> {
        let proxy = self.vault(vault)?.clone();
        proxy.owner()?;
        let implementation = self.factory(&proxy.factory())?.vault_implementation();
        let resolved = self
            .implementations
            .get(&implementation)
            .cloned()
            .ok_or(VaultError::UnknownImplementation(implementation))?;
        Ok((proxy, resolved))
    }

    fn resolve_vault_for_owner(
        &self,
        caller: &Address,
        vault: &Address,
    ) -> Result<(VaultProxy, Arc<dyn VaultImplementation>), SettlementError> {
        let (proxy, implementation) = self.resolve_vault(vault)?;
        proxy.require_owner(caller)?;
        Ok((proxy, implementation))
    }

    pub(crate) fn vault_execute_deposit(
        &mut self,
        caller: Address,
        vault: Address,
        source: Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault(&vault)?;
        proxy.require_factory(&caller)?;
        implementation.execute_deposit_into_vault(self, &proxy, source, amount)
    }

    pub(crate) fn vault_execute_withdrawal(
        &mut self,
        caller: Address,
        vault: Address,
        recipient: Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault(&vault)?;
        proxy.require_factory(&caller)?;
        implementation.execute_withdrawal_from_vault(self, &proxy, recipient, amount)
    }

    pub fn vault_deposit_into_vault(
        &mut self,
        caller: Address,
        vault: Address,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        self.atomically(|sys| {
            implementation.deposit_into_vault(sys, &proxy, to_account_number, amount)
        })
    }

    pub fn vault_withdraw_from_vault(
        &mut self,
        caller: Address,
        vault: Address,
        from_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        self.atomically(|sys| {
            implementation.withdraw_from_vault(sys, &proxy, from_account_number, amount)
        })
    }

    pub fn vault_deposit_other_token_into_dolomite_margin(
        &mut self,
        caller: Address,
        vault: Address,
        to_account_number: AccountNumber,
        market_id: MarketId,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        self.atomically(|sys| {
            implementation.deposit_other_token_into_dolomite_margin(
                sys,
                &proxy,
                to_account_number,
                market_id,
                amount,
            )
        })
    }

    pub fn vault_open_borrow_position(
        &mut self,
        caller: Address,
        vault: Address,
        from_account_number: AccountNumber,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        self.atomically(|sys| {
            implementation.open_borrow_position(
                sys,
                &proxy,
                from_account_number,
                to_account_number,
                amount,
            )
        })
    }

    pub fn vault_close_borrow_position_with_underlying_vault_token(
        &mut self,
        caller: Address,
        vault: Address,
        borrow_account_number: AccountNumber,
        to_account_number: AccountNumber,
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        self.atomically(|sys| {
            implementation.close_borrow_position_with_underlying_vault_token(
                sys,
                &proxy,
                borrow_account_number,
                to_account_number,
            )
        })
    }

    pub fn vault_close_borrow_position_with_other_tokens(
        &mut self,
        caller: Address,
        vault: Address,
        borrow_account_number: AccountNumber,
        to_account_number: AccountNumber,
        market_ids: &[MarketId],
    ) -> Result<(), SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        self.atomically(|sys| {
            implementation.close_borrow_position_with_other_tokens(
                sys,
                &proxy,
                borrow_account_number,
                to_account_number,
                market_ids,
            )
        })
    }

    /// Swap with the vault as the trade account owner.
    pub fn vault_swap_exact_input_for_output(
        &mut self,
        caller: Address,
        vault: Address,
        params: SwapParams,
    ) -> Result<SwapReceipt, SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        implementation.swap_exact_input_for_output(self, &proxy, params)
    }

    pub fn vault_swap_exact_input_for_output_and_modify_position(
        &mut self,
        caller: Address,
        vault: Address,
        params: ModifyPositionParams,
    ) -> Result<SwapReceipt, SettlementError> {
        let (proxy, implementation) = self.resolve_vault_for_owner(&caller, &vault)?;
        implementation.swap_exact_input_for_output_and_modify_position(self, &proxy, params)
    }
}
