//! Post-trade balance checks.

use serde::{Deserialize, Serialize};

/// Which side of a trade must end with non-negative balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceCheckFlag {
    /// No check.
    #[default]
    None,
    /// Check the source side only.
    From,
    /// Check the destination side only.
    To,
    /// Check both sides.
    Both,
}

impl BalanceCheckFlag {
    /// `true` for `From` and `Both`.
    pub fn checks_from(self) -> bool {
        matches!(self, BalanceCheckFlag::From | BalanceCheckFlag::Both)
    }

    /// `true` for `To` and `Both`.
    pub fn checks_to(self) -> bool {
        matches!(self, BalanceCheckFlag::To | BalanceCheckFlag::Both)
    }
}
