//! Trade path description types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use margin_protocol::ledger::BalanceCheckFlag;
use margin_protocol::{Account, AccountNumber, Address, MarketId, Timestamp, Wei};

/// How a leg obtains liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraderType {
    /// An exchange wrapper outside the ledger (`Sell`).
    ExternalLiquidity,
    /// An auto trader matched against a maker account (`Trade`).
    InternalLiquidity,
    /// Ordinary token into an isolation market (`Sell` to a wrapper).
    IsolationModeWrapper,
    /// Isolation shares out (`Call` + `Sell` to an unwrapper).
    IsolationModeUnwrapper,
}

impl fmt::Display for TraderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraderType::ExternalLiquidity => write!(f, "ExternalLiquidity"),
            TraderType::InternalLiquidity => write!(f, "InternalLiquidity"),
            TraderType::IsolationModeWrapper => write!(f, "IsolationModeWrapper"),
            TraderType::IsolationModeUnwrapper => write!(f, "IsolationModeUnwrapper"),
        }
    }
}

/// One leg of a trade path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderParam {
    pub trader: Address,
    pub trader_type: TraderType,
    /// Index into `maker_accounts`. Must be 0 unless the leg is
    /// `InternalLiquidity`.
    #[serde(default)]
    pub maker_account_index: usize,
    /// Opaque data handed to the trader.
    #[serde(default)]
    pub trade_data: Vec<u8>,
}

impl TraderParam {
    pub fn new(trader: Address, trader_type: TraderType) -> Self {
        Self {
            trader,
            trader_type,
            maker_account_index: 0,
            trade_data: Vec::new(),
        }
    }

    /// An internal liquidity leg against `maker_accounts[maker_account_index]`.
    pub fn internal(trader: Address, maker_account_index: usize) -> Self {
        Self {
            trader,
            trader_type: TraderType::InternalLiquidity,
            maker_account_index,
            trade_data: Vec::new(),
        }
    }
}

/// Whether a margin-position event accompanies the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[default]
    None,
    MarginPosition,
}

/// Caller preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Latest acceptable block time, inclusive.
    pub deadline: Timestamp,
    #[serde(default)]
    pub balance_check_flag: BalanceCheckFlag,
    #[serde(default)]
    pub event_type: EventType,
}

impl UserConfig {
    pub fn with_deadline(deadline: Timestamp) -> Self {
        Self {
            deadline,
            balance_check_flag: BalanceCheckFlag::None,
            event_type: EventType::None,
        }
    }
}

/// A chain of markets and the legs between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePath {
    pub market_ids_path: Vec<MarketId>,
    pub traders_path: Vec<TraderParam>,
    /// Amount of the first market to spend, or the amount sentinel for the
    /// whole positive balance.
    pub input_amount: Wei,
    pub min_output_amount: Wei,
    #[serde(default)]
    pub maker_accounts: Vec<Account>,
    pub user_config: UserConfig,
}

impl TradePath {
    pub fn input_market(&self) -> Option<MarketId> {
        self.market_ids_path.first().copied()
    }

    pub fn output_market(&self) -> Option<MarketId> {
        self.market_ids_path.last().copied()
    }
}

/// Arguments of `swap_exact_input_for_output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub trade_account_number: AccountNumber,
    #[serde(flatten)]
    pub path: TradePath,
}

/// One collateral movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAmount {
    pub market_id: MarketId,
    /// Amount, or the amount sentinel for the whole balance.
    pub amount_wei: Wei,
}

/// Collateral movements between two accounts of the trade account's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCollateralParams {
    pub from_account_number: AccountNumber,
    pub to_account_number: AccountNumber,
    pub transfer_amounts: Vec<TransferAmount>,
}

/// Expiry to apply to the trade account after the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryParams {
    pub market_id: MarketId,
    /// Seconds from now. Zero leaves the expiry untouched.
    pub expiry_time_delta: u64,
}

/// Arguments of `swap_exact_input_for_output_and_modify_position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyPositionParams {
    pub trade_account_number: AccountNumber,
    #[serde(flatten)]
    pub path: TradePath,
    pub transfer_collateral_params: TransferCollateralParams,
    #[serde(default)]
    pub expiry_params: Option<ExpiryParams>,
}

/// Outcome of a settled swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub id: Uuid,
    pub trade_account: Account,
    pub input_market: MarketId,
    pub output_market: MarketId,
    /// Input actually spent, after resolving the amount sentinel.
    pub input_amount: Wei,
    pub output_amount: Wei,
    pub legs: usize,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_params_parse_from_flat_json() {
        let json = r#"{
            "trade_account_number": 0,
            "market_ids_path": [0, 1],
            "traders_path": [{"trader": "0x0000000000000000000000000000000000000001", "trader_type": "external_liquidity"}],
            "input_amount": 10,
            "min_output_amount": 1,
            "user_config": {"deadline": 100}
        }"#;
        let params: SwapParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.path.market_ids_path, vec![0, 1]);
        assert_eq!(params.path.traders_path[0].maker_account_index, 0);
        assert_eq!(params.path.user_config.balance_check_flag, BalanceCheckFlag::None);
        assert!(params.path.maker_accounts.is_empty());
    }

    #[test]
    fn path_endpoints() {
        let path = TradePath {
            market_ids_path: vec![2, 0, 5],
            traders_path: vec![],
            input_amount: 1,
            min_output_amount: 1,
            maker_accounts: vec![],
            user_config: UserConfig::with_deadline(0),
        };
        assert_eq!(path.input_market(), Some(2));
        assert_eq!(path.output_market(), Some(5));
    }
}
