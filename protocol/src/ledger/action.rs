//! Actions accepted by the ledger's `operate` primitive.
//!
//! An operation is a list of accounts plus a list of actions that refer to
//! those accounts by index. The whole list runs atomically: any failing
//! action aborts the operation and nothing it did persists.

use serde::{Deserialize, Serialize};

use crate::types::{Address, AssetAmount, MarketId, Wei};

/// One step of a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Pull `amount` of the market's token from `from` and credit the account.
    Deposit {
        /// Account index.
        account: usize,
        /// Market to credit.
        market: MarketId,
        /// Exact amount pulled.
        amount: Wei,
        /// Wallet the tokens come from.
        from: Address,
    },
    /// Debit the account and push the market's token to `to`.
    Withdraw {
        /// Account index.
        account: usize,
        /// Market to debit.
        market: MarketId,
        /// Amount to withdraw.
        amount: AssetAmount,
        /// Recipient wallet.
        to: Address,
    },
    /// Move a balance between two accounts.
    Transfer {
        /// Source account index.
        account: usize,
        /// Destination account index.
        other: usize,
        /// Market to move.
        market: MarketId,
        /// Amount to move.
        amount: AssetAmount,
    },
    /// Swap through an external exchange wrapper: the input token is pushed to
    /// the wrapper, the wrapper reports its output and the ledger pulls it
    /// back.
    Sell {
        /// Account index.
        account: usize,
        /// Market sold.
        input_market: MarketId,
        /// Market bought.
        output_market: MarketId,
        /// Amount sold.
        amount: AssetAmount,
        /// Exchange wrapper address.
        exchange_wrapper: Address,
        /// Opaque data for the wrapper.
        data: Vec<u8>,
    },
    /// Swap against another ledger account, priced by an auto trader.
    Trade {
        /// Taker account index.
        account: usize,
        /// Maker account index.
        maker: usize,
        /// Market the taker gives.
        input_market: MarketId,
        /// Market the taker receives.
        output_market: MarketId,
        /// Amount the taker gives.
        amount: AssetAmount,
        /// Auto trader pricing the match.
        auto_trader: Address,
        /// Opaque data for the auto trader.
        data: Vec<u8>,
    },
    /// Invoke a callee with the account and a resolved amount.
    Call {
        /// Account index passed to the callee.
        account: usize,
        /// Market `amount` is resolved against.
        market: MarketId,
        /// Contract to call.
        callee: Address,
        /// Amount passed to the callee (resolved, not moved).
        amount: AssetAmount,
        /// Opaque data for the callee.
        data: Vec<u8>,
    },
}

impl Action {
    /// Index of the account the action primarily acts on.
    pub fn primary_account(&self) -> usize {
        match self {
            Action::Deposit { account, .. }
            | Action::Withdraw { account, .. }
            | Action::Transfer { account, .. }
            | Action::Sell { account, .. }
            | Action::Trade { account, .. }
            | Action::Call { account, .. } => *account,
        }
    }

    /// Index of the secondary account, if the action has one.
    pub fn secondary_account(&self) -> Option<usize> {
        match self {
            Action::Transfer { other, .. } => Some(*other),
            Action::Trade { maker, .. } => Some(*maker),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::Transfer { .. } => "transfer",
            Action::Sell { .. } => "sell",
            Action::Trade { .. } => "trade",
            Action::Call { .. } => "call",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_indices() {
        let transfer = Action::Transfer {
            account: 1,
            other: 2,
            market: 0,
            amount: AssetAmount::All,
        };
        assert_eq!(transfer.primary_account(), 1);
        assert_eq!(transfer.secondary_account(), Some(2));
        assert_eq!(transfer.kind(), "transfer");

        let call = Action::Call {
            account: 0,
            market: 1,
            callee: Address::from_label("unwrapper"),
            amount: AssetAmount::LastOutput,
            data: vec![],
        };
        assert_eq!(call.secondary_account(), None);
    }

    #[test]
    fn serde_is_tagged() {
        let deposit = Action::Deposit {
            account: 0,
            market: 2,
            amount: 10,
            from: Address::from_label("alice"),
        };
        let json = serde_json::to_value(&deposit).unwrap();
        assert_eq!(json["action"], "deposit");
        let back: Action = serde_json::from_value(json).unwrap();
        assert_eq!(back, deposit);
    }
}
