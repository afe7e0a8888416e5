//! Borrow-position proxy.
//!
//! Moves balances between two accounts of the same owner, which is how
//! isolated borrow positions are opened, topped up and closed. Only
//! authorized callers may use it; every vault is authorized when it is
//! created. The proxy is a global operator of the ledger and acts on the
//! caller's own accounts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info};

use margin_protocol::ledger::{Action, BalanceCheckFlag};
use margin_protocol::{Account, AccountNumber, Address, AssetAmount, MarketId, Wei};

use crate::error::SettlementError;
use crate::events::Event;
use crate::MarginSystem;

/// Errors raised by the borrow-position proxy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BorrowPositionError {
    #[error("caller not authorized: {0}")]
    CallerNotAuthorized(Address),

    /// Source and destination are the same account.
    #[error("from and to account are both #{0}")]
    SameAccount(AccountNumber),
}

/// Authorized-caller list of the proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BorrowPositionProxy {
    address: Address,
    authorized: BTreeSet<Address>,
}

impl BorrowPositionProxy {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            authorized: BTreeSet::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_caller_authorized(&self, caller: &Address) -> bool {
        self.authorized.contains(caller)
    }

    fn set_authorized(&mut self, caller: Address, authorized: bool) {
        if authorized {
            self.authorized.insert(caller);
        } else {
            self.authorized.remove(&caller);
        }
    }

    fn require_authorized(&self, caller: &Address) -> Result<(), BorrowPositionError> {
        if !self.is_caller_authorized(caller) {
            return Err(BorrowPositionError::CallerNotAuthorized(*caller));
        }
        Ok(())
    }
}

impl MarginSystem {
    /// Governance grants or revokes proxy access.
    pub fn set_is_caller_authorized(
        &mut self,
        caller: Address,
        target: Address,
        authorized: bool,
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        self.authorize_borrow_position_caller(target, authorized);
        Ok(())
    }

    pub(crate) fn authorize_borrow_position_caller(&mut self, target: Address, authorized: bool) {
        self.borrow_positions.set_authorized(target, authorized);
        debug!(caller = %target, authorized, "borrow position caller set");
        self.emit(Event::BorrowPositionCallerSet {
            caller: target,
            authorized,
        });
    }

    /// Moves `amount` of `market` from the caller's account
    /// `from_account_number` into a borrow position.
    pub fn open_borrow_position(
        &mut self,
        caller: Address,
        from_account_number: AccountNumber,
        to_account_number: AccountNumber,
        market: MarketId,
        amount: Wei,
        balance_check: BalanceCheckFlag,
    ) -> Result<(), SettlementError> {
        self.transfer_between_accounts(
            caller,
            from_account_number,
            to_account_number,
            market,
            amount,
            balance_check,
        )?;
        info!(
            owner = %caller,
            position = to_account_number,
            market,
            amount,
            "borrow position opened"
        );
        Ok(())
    }

    /// Moves every positive balance of `markets` from the borrow position
    /// back to `to_account_number`. Markets with nothing to move are skipped.
    pub fn close_borrow_position(
        &mut self,
        caller: Address,
        borrow_account_number: AccountNumber,
        to_account_number: AccountNumber,
        markets: &[MarketId],
    ) -> Result<(), SettlementError> {
        self.borrow_positions.require_authorized(&caller)?;
        if borrow_account_number == to_account_number {
            return Err(BorrowPositionError::SameAccount(borrow_account_number).into());
        }
        let borrow = Account::new(caller, borrow_account_number);
        let actions: Vec<Action> = markets
            .iter()
            .filter(|m| self.ledger.get_account_balance(&borrow, **m) > 0)
            .map(|m| Action::Transfer {
                account: 0,
                other: 1,
                market: *m,
                amount: AssetAmount::All,
            })
            .collect();
        if !actions.is_empty() {
            let proxy = self.borrow_positions.address();
            self.operate(
                proxy,
                &[borrow, Account::new(caller, to_account_number)],
                &actions,
            )?;
        }
        info!(owner = %caller, position = borrow_account_number, markets = markets.len(), "borrow position closed");
        Ok(())
    }

    /// Moves `amount` of `market` between two of the caller's accounts.
    /// The amount sentinel moves the whole positive balance.
    pub fn transfer_between_accounts(
        &mut self,
        caller: Address,
        from_account_number: AccountNumber,
        to_account_number: AccountNumber,
        market: MarketId,
        amount: Wei,
        balance_check: BalanceCheckFlag,
    ) -> Result<(), SettlementError> {
        self.borrow_positions.require_authorized(&caller)?;
        if from_account_number == to_account_number {
            return Err(BorrowPositionError::SameAccount(from_account_number).into());
        }
        let from = Account::new(caller, from_account_number);
        let to = Account::new(caller, to_account_number);
        let proxy = self.borrow_positions.address();

        self.atomically(|sys| {
            sys.operate(
                proxy,
                &[from, to],
                &[Action::Transfer {
                    account: 0,
                    other: 1,
                    market,
                    amount: AssetAmount::from_input(amount),
                }],
            )?;
            if balance_check.checks_from() {
                sys.ledger.verify_non_negative(&from, market)?;
            }
            if balance_check.checks_to() {
                sys.ledger.verify_non_negative(&to, market)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callers_need_authorization() {
        let mut sys = MarginSystem::default();
        let alice = Address::from_label("alice");
        let err = sys
            .transfer_between_accounts(alice, 0, 1, 0, 1, BalanceCheckFlag::None)
            .unwrap_err();
        assert_eq!(err, BorrowPositionError::CallerNotAuthorized(alice).into());

        let gov = sys.governance();
        sys.set_is_caller_authorized(gov, alice, true).unwrap();
        assert!(sys.borrow_positions().is_caller_authorized(&alice));
        assert!(sys.set_is_caller_authorized(alice, alice, true).is_err());
    }

    #[test]
    fn same_account_rejected() {
        let mut sys = MarginSystem::default();
        let gov = sys.governance();
        let alice = Address::from_label("alice");
        sys.set_is_caller_authorized(gov, alice, true).unwrap();
        assert_eq!(
            sys.close_borrow_position(alice, 3, 3, &[0]),
            Err(BorrowPositionError::SameAccount(3).into())
        );
    }

    #[test]
    fn open_and_close_move_balances() {
        let mut sys = MarginSystem::default();
        let gov = sys.governance();
        let usdc = Address::from_label("usdc");
        let alice = Address::from_label("alice");
        sys.tokens_mut().register(usdc, "USD Coin", "USDC", 6, gov).unwrap();
        let market = sys.add_market(gov, usdc, true).unwrap();
        sys.tokens_mut().mint(&usdc, &gov, &alice, 100).unwrap();
        let ledger = sys.ledger_address();
        sys.tokens_mut().approve(&usdc, &alice, &ledger, 100).unwrap();
        sys.operate(
            alice,
            &[Account::default_of(alice)],
            &[Action::Deposit {
                account: 0,
                market,
                amount: 100,
                from: alice,
            }],
        )
        .unwrap();
        sys.set_is_caller_authorized(gov, alice, true).unwrap();

        sys.open_borrow_position(alice, 0, 42, market, 60, BalanceCheckFlag::From)
            .unwrap();
        let position = Account::new(alice, 42);
        assert_eq!(sys.ledger().get_account_balance(&position, market), 60);

        // over-drawing the source breaks the From check even though the
        // market allows borrowing
        let err = sys
            .open_borrow_position(alice, 0, 43, market, 50, BalanceCheckFlag::From)
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Ledger(margin_protocol::ledger::LedgerError::AccountCannotGoNegative { .. })
        ));

        sys.close_borrow_position(alice, 42, 0, &[market]).unwrap();
        assert_eq!(sys.ledger().get_account_balance(&position, market), 0);
        assert_eq!(
            sys.ledger()
                .get_account_balance(&Account::default_of(alice), market),
            100
        );
    }
}
