//! Generic trader.
//!
//! Executes a swap through an ordered path of markets, one trader per leg,
//! as a single ledger operation. Legs may pull liquidity from an external
//! exchange wrapper, from a maker account through an auto trader, or convert
//! into and out of isolation-mode markets through trusted converters.
//!
//! Paths are validated in full before any balance moves (see
//! [`validate_trade_path`]). The position-modifying variant also moves
//! collateral between two accounts of the same owner and can set an expiry
//! on the trade account.

mod executor;
pub mod types;
pub mod validation;

pub use types::{
    EventType, ExpiryParams, ModifyPositionParams, SwapParams, SwapReceipt, TradePath,
    TraderParam, TraderType, TransferAmount, TransferCollateralParams, UserConfig,
};
pub use validation::{
    validate_collateral_transfer, validate_trade_path, PathContext, PathError, ValidatedLeg,
    ValidatedPath,
};
