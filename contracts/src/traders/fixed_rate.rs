//! Fixed-rate liquidity sources.
//!
//! [`FixedRateExchange`] is an inventory-backed external venue: it pays out
//! of its own token balance at a configured rate. [`FixedRateAutoTrader`]
//! prices internal matches against a maker account at a configured rate.

use std::collections::BTreeMap;
use tracing::debug;

use margin_protocol::{Address, MarketId, Wei};

use super::{AutoTradeRequest, AutoTrader, ExchangeRequest, ExchangeWrapper, Rate, TraderError};
use crate::error::SettlementError;
use crate::MarginSystem;

/// External liquidity at fixed token-pair rates.
#[derive(Debug, Clone)]
pub struct FixedRateExchange {
    address: Address,
    rates: BTreeMap<(Address, Address), Rate>,
}

impl FixedRateExchange {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            rates: BTreeMap::new(),
        }
    }

    /// Quotes `input → output` at `rate`.
    pub fn with_rate(mut self, input: Address, output: Address, rate: Rate) -> Self {
        self.rates.insert((input, output), rate);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Output for `amount` of `input`, without executing anything.
    pub fn quote(&self, input: &Address, output: &Address, amount: Wei) -> Result<Wei, TraderError> {
        let rate = self
            .rates
            .get(&(*input, *output))
            .ok_or(TraderError::UnsupportedTokenPair {
                input: *input,
                output: *output,
            })?;
        rate.apply(amount)
    }
}

impl ExchangeWrapper for FixedRateExchange {
    fn exchange(
        &self,
        system: &mut MarginSystem,
        request: &ExchangeRequest,
    ) -> Result<Wei, SettlementError> {
        let output = self.quote(&request.input_token, &request.output_token, request.input_amount)?;
        system
            .tokens_mut()
            .approve(&request.output_token, &self.address, &request.receiver, output)?;
        debug!(
            exchange = %self.address,
            input = request.input_amount,
            output,
            "fixed rate exchange filled"
        );
        Ok(output)
    }
}

/// Internal liquidity at fixed market-pair rates.
#[derive(Debug, Clone)]
pub struct FixedRateAutoTrader {
    address: Address,
    rates: BTreeMap<(MarketId, MarketId), Rate>,
}

impl FixedRateAutoTrader {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            rates: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, input: MarketId, output: MarketId, rate: Rate) -> Self {
        self.rates.insert((input, output), rate);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl AutoTrader for FixedRateAutoTrader {
    fn get_trade_cost(
        &self,
        _system: &MarginSystem,
        request: &AutoTradeRequest,
    ) -> Result<Wei, SettlementError> {
        let rate = self
            .rates
            .get(&(request.input_market, request.output_market))
            .ok_or(TraderError::UnsupportedMarketPair {
                input: request.input_market,
                output: request.output_market,
            })?;
        Ok(rate.apply(request.input_amount)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_protocol::Account;

    #[test]
    fn exchange_quotes_configured_pairs_only() {
        let usdc = Address::from_label("usdc");
        let weth = Address::from_label("weth");
        let ex = FixedRateExchange::new(Address::from_label("dex"))
            .with_rate(usdc, weth, Rate::new(1, 2000).unwrap());
        assert_eq!(ex.quote(&usdc, &weth, 4000).unwrap(), 2);
        assert!(matches!(
            ex.quote(&weth, &usdc, 1),
            Err(TraderError::UnsupportedTokenPair { .. })
        ));
    }

    #[test]
    fn exchange_approves_the_receiver() {
        let mut sys = MarginSystem::default();
        let gov = sys.governance();
        let usdc = Address::from_label("usdc");
        let weth = Address::from_label("weth");
        let dex = Address::from_label("dex");
        sys.tokens_mut().register(weth, "Wrapped Ether", "WETH", 18, gov).unwrap();
        let ex = FixedRateExchange::new(dex).with_rate(usdc, weth, Rate::new(1, 10).unwrap());

        let request = ExchangeRequest {
            trade_originator: Address::from_label("alice"),
            receiver: sys.ledger_address(),
            input_token: usdc,
            output_token: weth,
            input_amount: 100,
            data: vec![],
        };
        assert_eq!(ex.exchange(&mut sys, &request).unwrap(), 10);
        assert_eq!(
            sys.tokens().allowance(&weth, &dex, &sys.ledger_address()),
            10
        );
    }

    #[test]
    fn auto_trader_prices_market_pairs() {
        let sys = MarginSystem::default();
        let amm = FixedRateAutoTrader::new(Address::from_label("amm"))
            .with_rate(0, 1, Rate::new(3, 1).unwrap());
        let request = AutoTradeRequest {
            input_market: 0,
            output_market: 1,
            maker_account: Account::default_of(Address::from_label("maker")),
            taker_account: Account::default_of(Address::from_label("taker")),
            input_amount: 7,
            data: vec![],
        };
        assert_eq!(amm.get_trade_cost(&sys, &request).unwrap(), 21);

        let reversed = AutoTradeRequest {
            input_market: 1,
            output_market: 0,
            ..request
        };
        assert!(amm.get_trade_cost(&sys, &reversed).is_err());
    }
}
