//! Isolation-mode token converters.
//!
//! Converters are the only exchange wrappers that may touch an
//! isolation-mode market, and only after the market's factory trusts them.
//! Each one is bound to a single factory and declares the tokens it accepts
//! and produces.
//!
//! **Wrapper** (ordinary → shares): pays underlying out of its own inventory
//! into the trade originator's vault. It approves the vault for the
//! underlying, enqueues an into-ledger share transfer, and lets the ledger
//! pull the shares.
//!
//! **Unwrapper** (shares → ordinary, or shares → another isolation market):
//! the ledger first `Call`s it so it can enqueue an out-of-ledger share
//! transfer, then `Sell`s the shares to it. The vault's underlying lands in
//! the unwrapper, which pays the output out of its inventory.

use std::collections::BTreeSet;
use tracing::debug;

use margin_protocol::{Address, Wei};

use super::{
    CallRequest, ExchangeRequest, ExchangeWrapper, LedgerCallee, Rate, TokenConverter,
    TraderError,
};
use crate::error::SettlementError;
use crate::MarginSystem;

/// Converts ordinary tokens into isolation-mode shares.
#[derive(Debug, Clone)]
pub struct IsolationModeWrapper {
    address: Address,
    factory: Address,
    input_tokens: BTreeSet<Address>,
    rate: Rate,
}

impl IsolationModeWrapper {
    pub fn new(address: Address, factory: Address, rate: Rate) -> Self {
        Self {
            address,
            factory,
            input_tokens: BTreeSet::new(),
            rate,
        }
    }

    /// Accepts `token` as input.
    pub fn accepting(mut self, token: Address) -> Self {
        self.input_tokens.insert(token);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl ExchangeWrapper for IsolationModeWrapper {
    fn exchange(
        &self,
        system: &mut MarginSystem,
        request: &ExchangeRequest,
    ) -> Result<Wei, SettlementError> {
        if !self.is_valid_output_token(&request.output_token) {
            return Err(TraderError::InvalidOutputToken(request.output_token).into());
        }
        if !self.is_valid_input_token(&request.input_token) {
            return Err(TraderError::InvalidInputToken(request.input_token).into());
        }
        let vault = request.trade_originator;
        let factory = system.factory(&self.factory)?;
        if !factory.is_vault(&vault) {
            return Err(TraderError::InvalidTradeOriginator(vault).into());
        }
        let underlying = factory.underlying_token();
        let output = self.rate.apply(request.input_amount)?;

        system
            .tokens_mut()
            .approve(&underlying, &self.address, &vault, output)?;
        system.enqueue_transfer_into_dolomite_margin(self.address, self.factory, vault, output)?;

        debug!(
            wrapper = %self.address,
            vault = %vault,
            input = request.input_amount,
            output,
            "wrapped into vault"
        );
        Ok(output)
    }
}

impl LedgerCallee for IsolationModeWrapper {
    fn call_function(
        &self,
        _system: &mut MarginSystem,
        _request: &CallRequest,
    ) -> Result<(), SettlementError> {
        Err(TraderError::UnsupportedCall(self.address).into())
    }
}

impl TokenConverter for IsolationModeWrapper {
    fn vault_factory(&self) -> Address {
        self.factory
    }

    fn is_valid_input_token(&self, token: &Address) -> bool {
        self.input_tokens.contains(token)
    }

    fn is_valid_output_token(&self, token: &Address) -> bool {
        *token == self.factory
    }
}

/// Converts isolation-mode shares back into ordinary tokens or into another
/// isolation market's shares.
#[derive(Debug, Clone)]
pub struct IsolationModeUnwrapper {
    address: Address,
    factory: Address,
    output_tokens: BTreeSet<Address>,
    rate: Rate,
}

impl IsolationModeUnwrapper {
    pub fn new(address: Address, factory: Address, rate: Rate) -> Self {
        Self {
            address,
            factory,
            output_tokens: BTreeSet::new(),
            rate,
        }
    }

    /// Produces `token` as output. Another factory's address enables
    /// conversion straight into that isolation market.
    pub fn producing(mut self, token: Address) -> Self {
        self.output_tokens.insert(token);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Makes `output` pullable by the ledger when it is another factory's
    /// share token: the owner's vault in that factory receives the
    /// underlying. The generic trader then moves the new shares to that
    /// vault's account.
    fn deliver_into_isolation_market(
        &self,
        system: &mut MarginSystem,
        originator: Address,
        target_factory: Address,
        output: Wei,
    ) -> Result<(), SettlementError> {
        let owner = system
            .factory(&self.factory)?
            .get_account_by_vault(&originator)
            .ok_or(TraderError::InvalidTradeOriginator(originator))?;
        let target = system.factory(&target_factory)?;
        let target_vault =
            target
                .get_vault_by_account(&owner)
                .ok_or(TraderError::NoVaultForOwner {
                    factory: target_factory,
                    owner,
                })?;
        let underlying = target.underlying_token();

        system
            .tokens_mut()
            .approve(&underlying, &self.address, &target_vault, output)?;
        system.enqueue_transfer_into_dolomite_margin(
            self.address,
            target_factory,
            target_vault,
            output,
        )?;
        Ok(())
    }
}

impl LedgerCallee for IsolationModeUnwrapper {
    fn call_function(
        &self,
        system: &mut MarginSystem,
        request: &CallRequest,
    ) -> Result<(), SettlementError> {
        let vault = request.account.owner;
        if !system.factory(&self.factory)?.is_vault(&vault) {
            return Err(TraderError::InvalidTradeOriginator(vault).into());
        }
        system.enqueue_transfer_from_dolomite_margin(self.address, self.factory, vault, request.amount)?;
        Ok(())
    }
}

impl ExchangeWrapper for IsolationModeUnwrapper {
    fn exchange(
        &self,
        system: &mut MarginSystem,
        request: &ExchangeRequest,
    ) -> Result<Wei, SettlementError> {
        if !self.is_valid_input_token(&request.input_token) {
            return Err(TraderError::InvalidInputToken(request.input_token).into());
        }
        if !self.is_valid_output_token(&request.output_token) {
            return Err(TraderError::InvalidOutputToken(request.output_token).into());
        }
        let output = self.rate.apply(request.input_amount)?;

        if system.is_vault_factory(&request.output_token) {
            self.deliver_into_isolation_market(
                system,
                request.trade_originator,
                request.output_token,
                output,
            )?;
        } else {
            system.tokens_mut().approve(
                &request.output_token,
                &self.address,
                &request.receiver,
                output,
            )?;
        }

        debug!(
            unwrapper = %self.address,
            vault = %request.trade_originator,
            input = request.input_amount,
            output,
            "unwrapped from vault"
        );
        Ok(output)
    }
}

impl TokenConverter for IsolationModeUnwrapper {
    fn vault_factory(&self) -> Address {
        self.factory
    }

    fn is_valid_input_token(&self, token: &Address) -> bool {
        *token == self.factory
    }

    fn is_valid_output_token(&self, token: &Address) -> bool {
        self.output_tokens.contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_allow_lists() {
        let factory = Address::from_label("factory-glp");
        let usdc = Address::from_label("usdc");
        let weth = Address::from_label("weth");

        let wrapper = IsolationModeWrapper::new(Address::from_label("w"), factory, Rate::one())
            .accepting(usdc);
        assert!(wrapper.is_valid_input_token(&usdc));
        assert!(!wrapper.is_valid_input_token(&weth));
        assert!(wrapper.is_valid_output_token(&factory));
        assert!(!wrapper.is_valid_output_token(&usdc));

        let unwrapper =
            IsolationModeUnwrapper::new(Address::from_label("u"), factory, Rate::one())
                .producing(usdc);
        assert!(unwrapper.is_valid_input_token(&factory));
        assert!(unwrapper.is_valid_output_token(&usdc));
        assert!(!unwrapper.is_valid_output_token(&weth));
        assert_eq!(unwrapper.vault_factory(), factory);
    }

    #[test]
    fn wrapper_rejects_ledger_calls() {
        let mut sys = MarginSystem::default();
        let wrapper = IsolationModeWrapper::new(
            Address::from_label("w"),
            Address::from_label("factory"),
            Rate::one(),
        );
        let request = CallRequest {
            sender: Address::from_label("alice"),
            account: margin_protocol::Account::default_of(Address::from_label("alice")),
            market: 0,
            amount: 1,
            data: vec![],
        };
        assert_eq!(
            wrapper.call_function(&mut sys, &request),
            Err(TraderError::UnsupportedCall(wrapper.address()).into())
        );
    }
}
