//! Swap execution.
//!
//! A validated path becomes one ledger operation issued by the generic
//! trader, which is a global operator of the ledger. Every entry point
//! holds the reentrancy guard and runs atomically.

use tracing::{info, warn};
use uuid::Uuid;

use margin_protocol::ledger::{Action, BalanceCheckFlag};
use margin_protocol::{Account, AccountNumber, Address, AssetAmount, MarketId};

use super::types::{
    ExpiryParams, ModifyPositionParams, SwapParams, SwapReceipt, TradePath, TraderType,
    TransferCollateralParams,
};
use super::validation::{validate_collateral_transfer, validate_trade_path, ValidatedPath};
use crate::error::SettlementError;
use crate::events::Event;
use crate::reentrancy::ReentrancyGuard;
use crate::traders::TraderError;
use crate::MarginSystem;

/// Collateral movement resolved against the trade account's owner.
struct CollateralPlan<'a> {
    params: &'a TransferCollateralParams,
    from: Account,
    to: Account,
}

impl MarginSystem {
    /// Swaps along `params.path` for the caller's own trade account.
    pub fn swap_exact_input_for_output(
        &mut self,
        caller: Address,
        params: SwapParams,
    ) -> Result<SwapReceipt, SettlementError> {
        self.guarded_swap(caller, params.trade_account_number, params.path, None, None)
    }

    /// Like [`swap_exact_input_for_output`](Self::swap_exact_input_for_output)
    /// on an account of `account_owner`, who must have approved the caller.
    pub fn swap_exact_input_for_output_for_different_account(
        &mut self,
        caller: Address,
        account_owner: Address,
        params: SwapParams,
    ) -> Result<SwapReceipt, SettlementError> {
        self.require_account_operator(&caller, &account_owner)?;
        self.guarded_swap(
            account_owner,
            params.trade_account_number,
            params.path,
            None,
            None,
        )
    }

    /// Swap plus collateral movement and an optional expiry.
    pub fn swap_exact_input_for_output_and_modify_position(
        &mut self,
        caller: Address,
        params: ModifyPositionParams,
    ) -> Result<SwapReceipt, SettlementError> {
        self.guarded_swap(
            caller,
            params.trade_account_number,
            params.path,
            Some(&params.transfer_collateral_params),
            params.expiry_params,
        )
    }

    pub fn swap_exact_input_for_output_and_modify_position_for_different_account(
        &mut self,
        caller: Address,
        account_owner: Address,
        params: ModifyPositionParams,
    ) -> Result<SwapReceipt, SettlementError> {
        self.require_account_operator(&caller, &account_owner)?;
        self.guarded_swap(
            account_owner,
            params.trade_account_number,
            params.path,
            Some(&params.transfer_collateral_params),
            params.expiry_params,
        )
    }

    fn require_account_operator(
        &self,
        caller: &Address,
        owner: &Address,
    ) -> Result<(), SettlementError> {
        if !self.ledger.is_operator_for(owner, caller) {
            return Err(SettlementError::NotOperator {
                caller: *caller,
                owner: *owner,
            });
        }
        Ok(())
    }

    fn guarded_swap(
        &mut self,
        owner: Address,
        trade_account_number: AccountNumber,
        path: TradePath,
        collateral: Option<&TransferCollateralParams>,
        expiry: Option<ExpiryParams>,
    ) -> Result<SwapReceipt, SettlementError> {
        let result = ReentrancyGuard::scoped(self, |sys| {
            sys.atomically(|sys| {
                sys.execute_swap(owner, trade_account_number, &path, collateral, expiry)
            })
        });
        if let Err(err) = &result {
            warn!(
                owner = %owner,
                account = trade_account_number,
                kind = err.kind().as_str(),
                error = %err,
                "swap rejected"
            );
        }
        result
    }

    fn execute_swap(
        &mut self,
        owner: Address,
        trade_account_number: AccountNumber,
        path: &TradePath,
        collateral: Option<&TransferCollateralParams>,
        expiry: Option<ExpiryParams>,
    ) -> Result<SwapReceipt, SettlementError> {
        let trade_account = Account::new(owner, trade_account_number);
        let validated = validate_trade_path(&*self, &trade_account, path)?;

        let plan = match collateral {
            Some(params) => {
                validate_collateral_transfer(
                    trade_account_number,
                    validated.output_market,
                    params,
                )?;
                Some(CollateralPlan {
                    params,
                    from: Account::new(owner, params.from_account_number),
                    to: Account::new(owner, params.to_account_number),
                })
            }
            None => None,
        };

        let handoff = self.isolation_handoff(&trade_account, &validated)?;
        let (accounts, actions) =
            build_operation(&trade_account, path, &validated, plan.as_ref(), handoff);
        let generic_trader = self.generic_trader_address();
        let output = self
            .operate(generic_trader, &accounts, &actions)?
            .unwrap_or(0);
        if output < path.min_output_amount {
            return Err(SettlementError::InsufficientOutputAmount {
                min_output: path.min_output_amount,
                actual: output,
            });
        }

        if let Some(expiry) = expiry {
            self.apply_expiry(trade_account, expiry.market_id, expiry.expiry_time_delta)?;
        }

        let flag = path.user_config.balance_check_flag;
        match &plan {
            Some(plan) => self.check_position_balances(flag, plan, validated.input_market)?,
            None => self.check_swap_balances(flag, &trade_account, &validated)?,
        }

        let receipt = SwapReceipt {
            id: Uuid::new_v4(),
            trade_account,
            input_market: validated.input_market,
            output_market: validated.output_market,
            input_amount: validated.input_amount,
            output_amount: output,
            legs: validated.legs.len(),
            executed_at: self.clock(),
        };
        info!(
            swap = %receipt.id,
            account = %trade_account,
            input_market = receipt.input_market,
            output_market = receipt.output_market,
            input_amount = receipt.input_amount,
            output_amount = receipt.output_amount,
            legs = receipt.legs,
            "swap executed"
        );
        self.emit(Event::SwapExecuted {
            receipt: receipt.clone(),
            event_type: path.user_config.event_type,
        });
        Ok(receipt)
    }

    /// When the path ends by unwrapping one isolation market into another,
    /// the account that must receive the new shares: the matching account of
    /// the trade vault owner's vault in the output market.
    fn isolation_handoff(
        &self,
        trade_account: &Account,
        validated: &ValidatedPath,
    ) -> Result<Option<Account>, SettlementError> {
        let Some(leg) = validated.legs.last() else {
            return Ok(None);
        };
        let input = self.ledger.market(leg.input_market)?;
        let output = self.ledger.market(leg.output_market)?;
        if !(input.is_isolation_mode && output.is_isolation_mode) {
            return Ok(None);
        }

        let vault = trade_account.owner;
        let owner = self
            .factory(&input.token)?
            .get_account_by_vault(&vault)
            .ok_or(TraderError::InvalidTradeOriginator(vault))?;
        let target = self
            .factory(&output.token)?
            .get_vault_by_account(&owner)
            .ok_or(TraderError::NoVaultForOwner {
                factory: output.token,
                owner,
            })?;
        Ok(Some(Account::new(target, trade_account.number)))
    }

    fn check_swap_balances(
        &self,
        flag: BalanceCheckFlag,
        trade_account: &Account,
        validated: &ValidatedPath,
    ) -> Result<(), SettlementError> {
        if flag.checks_from() {
            self.ledger
                .verify_non_negative(trade_account, validated.input_market)?;
        }
        if flag.checks_to() {
            self.ledger
                .verify_non_negative(trade_account, validated.output_market)?;
        }
        Ok(())
    }

    fn check_position_balances(
        &self,
        flag: BalanceCheckFlag,
        plan: &CollateralPlan<'_>,
        input_market: MarketId,
    ) -> Result<(), SettlementError> {
        let moved = plan.params.transfer_amounts.iter().map(|t| t.market_id);
        if flag.checks_from() {
            for market in moved.clone() {
                self.ledger.verify_non_negative(&plan.from, market)?;
            }
        }
        if flag.checks_to() {
            self.ledger.verify_non_negative(&plan.to, input_market)?;
            for market in moved {
                self.ledger.verify_non_negative(&plan.to, market)?;
            }
        }
        Ok(())
    }
}

/// Accounts are `[trade, makers.., collateral counterpart, handoff vault]`.
///
/// With a `handoff` account, the output of the final unwrap moves there
/// right after the sell.
fn build_operation(
    trade_account: &Account,
    path: &TradePath,
    validated: &ValidatedPath,
    plan: Option<&CollateralPlan<'_>>,
    handoff: Option<Account>,
) -> (Vec<Account>, Vec<Action>) {
    let mut accounts = Vec::with_capacity(path.maker_accounts.len() + 3);
    accounts.push(*trade_account);
    accounts.extend(path.maker_accounts.iter().copied());

    let mut pre = Vec::new();
    let mut post = Vec::new();
    if let Some(plan) = plan {
        let counterpart = if plan.from == *trade_account {
            plan.to
        } else {
            plan.from
        };
        let counterpart_index = accounts.len();
        accounts.push(counterpart);
        let (from_index, to_index) = if plan.from == *trade_account {
            (0, counterpart_index)
        } else {
            (counterpart_index, 0)
        };
        for transfer in &plan.params.transfer_amounts {
            let action = Action::Transfer {
                account: from_index,
                other: to_index,
                market: transfer.market_id,
                amount: AssetAmount::from_input(transfer.amount_wei),
            };
            if transfer.market_id == validated.output_market {
                post.push(action);
            } else {
                pre.push(action);
            }
        }
    }

    let mut actions = pre;
    for (index, leg) in validated.legs.iter().enumerate() {
        let amount = if index == 0 {
            AssetAmount::Wei(validated.input_amount)
        } else {
            AssetAmount::LastOutput
        };
        let trader = &leg.trader;
        match trader.trader_type {
            TraderType::IsolationModeUnwrapper => {
                actions.push(Action::Call {
                    account: 0,
                    market: leg.input_market,
                    callee: trader.trader,
                    amount,
                    data: trader.trade_data.clone(),
                });
                actions.push(sell(leg.input_market, leg.output_market, amount, trader.trader, &trader.trade_data));
                let last = index + 1 == validated.legs.len();
                if let Some(target) = handoff.filter(|_| last) {
                    accounts.push(target);
                    actions.push(Action::Transfer {
                        account: 0,
                        other: accounts.len() - 1,
                        market: leg.output_market,
                        amount: AssetAmount::LastOutput,
                    });
                }
            }
            TraderType::IsolationModeWrapper | TraderType::ExternalLiquidity => {
                actions.push(sell(leg.input_market, leg.output_market, amount, trader.trader, &trader.trade_data));
            }
            TraderType::InternalLiquidity => actions.push(Action::Trade {
                account: 0,
                maker: 1 + trader.maker_account_index,
                input_market: leg.input_market,
                output_market: leg.output_market,
                amount,
                auto_trader: trader.trader,
                data: trader.trade_data.clone(),
            }),
        }
    }
    actions.extend(post);
    (accounts, actions)
}

fn sell(
    input_market: MarketId,
    output_market: MarketId,
    amount: AssetAmount,
    exchange_wrapper: Address,
    data: &[u8],
) -> Action {
    Action::Sell {
        account: 0,
        input_market,
        output_market,
        amount,
        exchange_wrapper,
        data: data.to_vec(),
    }
}
