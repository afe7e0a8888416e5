//! The ledger's `operate` engine.
//!
//! An operation is a list of accounts and a list of actions referring to
//! them by index. Actions run in order; `LastOutput` amounts chain the
//! output of one `Sell`/`Trade` into the next action. When every action has
//! run, no touched account may hold a negative balance in a market that
//! does not allow borrowing. The whole operation is atomic.

use std::collections::BTreeSet;
use tracing::debug;

use margin_protocol::ledger::{Action, LedgerError};
use margin_protocol::{Account, Address, MarketId, Wei};

use super::MarginSystem;
use crate::error::SettlementError;
use crate::traders::{AutoTradeRequest, CallRequest, ExchangeRequest};

fn account_at(accounts: &[Account], index: usize) -> Result<Account, LedgerError> {
    accounts
        .get(index)
        .copied()
        .ok_or(LedgerError::InvalidAccountIndex {
            index,
            len: accounts.len(),
        })
}

impl MarginSystem {
    /// Runs `actions` against `accounts` on behalf of `caller`.
    ///
    /// Returns the output of the last `Sell` or `Trade`, if any.
    ///
    /// # Errors
    ///
    /// Any failing action aborts the operation and nothing it did persists.
    pub fn operate(
        &mut self,
        caller: Address,
        accounts: &[Account],
        actions: &[Action],
    ) -> Result<Option<Wei>, SettlementError> {
        self.atomically(|sys| sys.run_operation(caller, accounts, actions))
    }

    fn authorize_operation(
        &self,
        caller: &Address,
        accounts: &[Account],
        actions: &[Action],
    ) -> Result<(), SettlementError> {
        let mut seen = BTreeSet::new();
        for account in accounts {
            if !seen.insert(*account) {
                return Err(LedgerError::DuplicateAccount(*account).into());
            }
        }

        for action in actions {
            let primary = account_at(accounts, action.primary_account())?;
            self.ledger.require_operator(&primary.owner, caller)?;
            match action {
                Action::Transfer { other, .. } => {
                    let other = account_at(accounts, *other)?;
                    self.ledger.require_operator(&other.owner, caller)?;
                }
                Action::Trade {
                    maker, auto_trader, ..
                } => {
                    let maker = account_at(accounts, *maker)?;
                    if !self.ledger.is_operator_for(&maker.owner, auto_trader) {
                        return Err(LedgerError::UnpermissionedTrade {
                            trader: *auto_trader,
                            maker: maker.owner,
                        }
                        .into());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn run_operation(
        &mut self,
        caller: Address,
        accounts: &[Account],
        actions: &[Action],
    ) -> Result<Option<Wei>, SettlementError> {
        self.authorize_operation(&caller, accounts, actions)?;

        let mut last_output: Option<Wei> = None;
        for (index, action) in actions.iter().enumerate() {
            debug!(index, action = action.kind(), caller = %caller, "operate action");
            if let Some(output) = self.run_action(caller, accounts, action, last_output)? {
                last_output = Some(output);
            }
        }

        self.ledger.verify_borrowing_allowed(accounts)?;
        Ok(last_output)
    }

    fn run_action(
        &mut self,
        caller: Address,
        accounts: &[Account],
        action: &Action,
        last_output: Option<Wei>,
    ) -> Result<Option<Wei>, SettlementError> {
        match action {
            Action::Deposit {
                account,
                market,
                amount,
                from,
            } => {
                let account = account_at(accounts, *account)?;
                if *amount == 0 {
                    return Err(LedgerError::ZeroAmount.into());
                }
                let token = self.ledger.market_token(*market)?;
                self.ledger_pull(&token, from, *amount)?;
                self.ledger.credit(&account, *market, *amount)?;
                Ok(None)
            }

            Action::Withdraw {
                account,
                market,
                amount,
                to,
            } => {
                let account = account_at(accounts, *account)?;
                let amount = self
                    .ledger
                    .resolve_amount(&account, *market, *amount, last_output)?;
                let token = self.ledger.market_token(*market)?;
                self.ledger.debit(&account, *market, amount)?;
                self.ledger_push(&token, to, amount)?;
                Ok(None)
            }

            Action::Transfer {
                account,
                other,
                market,
                amount,
            } => {
                let from = account_at(accounts, *account)?;
                let to = account_at(accounts, *other)?;
                let amount = self
                    .ledger
                    .resolve_amount(&from, *market, *amount, last_output)?;
                self.ledger.debit(&from, *market, amount)?;
                self.ledger.credit(&to, *market, amount)?;
                Ok(None)
            }

            Action::Sell {
                account,
                input_market,
                output_market,
                amount,
                exchange_wrapper,
                data,
            } => {
                let account = account_at(accounts, *account)?;
                check_distinct_markets(*input_market, *output_market)?;
                let amount = self
                    .ledger
                    .resolve_amount(&account, *input_market, *amount, last_output)?;
                let wrapper = self
                    .exchange_wrappers
                    .get(exchange_wrapper)
                    .cloned()
                    .ok_or(LedgerError::UnknownCounterparty(*exchange_wrapper))?;
                let input_token = self.ledger.market_token(*input_market)?;
                let output_token = self.ledger.market_token(*output_market)?;

                self.ledger.debit(&account, *input_market, amount)?;
                self.ledger_push(&input_token, exchange_wrapper, amount)?;

                let request = ExchangeRequest {
                    trade_originator: account.owner,
                    receiver: self.ledger_address(),
                    input_token,
                    output_token,
                    input_amount: amount,
                    data: data.clone(),
                };
                let output = wrapper.exchange(self, &request)?;
                if output == 0 {
                    return Err(LedgerError::ZeroAmount.into());
                }

                self.ledger_pull(&output_token, exchange_wrapper, output)?;
                self.ledger.credit(&account, *output_market, output)?;
                Ok(Some(output))
            }

            Action::Trade {
                account,
                maker,
                input_market,
                output_market,
                amount,
                auto_trader,
                data,
            } => {
                let taker = account_at(accounts, *account)?;
                let maker = account_at(accounts, *maker)?;
                check_distinct_markets(*input_market, *output_market)?;
                let amount = self
                    .ledger
                    .resolve_amount(&taker, *input_market, *amount, last_output)?;
                let trader = self
                    .auto_traders
                    .get(auto_trader)
                    .cloned()
                    .ok_or(LedgerError::UnknownCounterparty(*auto_trader))?;

                let request = AutoTradeRequest {
                    input_market: *input_market,
                    output_market: *output_market,
                    maker_account: maker,
                    taker_account: taker,
                    input_amount: amount,
                    data: data.clone(),
                };
                let output = trader.get_trade_cost(self, &request)?;
                if output == 0 {
                    return Err(LedgerError::ZeroAmount.into());
                }

                self.ledger.debit(&taker, *input_market, amount)?;
                self.ledger.credit(&maker, *input_market, amount)?;
                self.ledger.debit(&maker, *output_market, output)?;
                self.ledger.credit(&taker, *output_market, output)?;
                Ok(Some(output))
            }

            Action::Call {
                account,
                market,
                callee,
                amount,
                data,
            } => {
                let account = account_at(accounts, *account)?;
                let amount = self
                    .ledger
                    .resolve_amount(&account, *market, *amount, last_output)?;
                let target = self
                    .callees
                    .get(callee)
                    .cloned()
                    .ok_or(LedgerError::UnknownCounterparty(*callee))?;
                let request = CallRequest {
                    sender: caller,
                    account,
                    market: *market,
                    amount,
                    data: data.clone(),
                };
                target.call_function(self, &request)?;
                Ok(None)
            }
        }
    }
}

fn check_distinct_markets(input: MarketId, output: MarketId) -> Result<(), LedgerError> {
    if input == output {
        return Err(LedgerError::SameMarketTrade(input));
    }
    Ok(())
}
