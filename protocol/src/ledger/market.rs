//! Market registry.

use serde::{Deserialize, Serialize};

use crate::types::{Address, MarketId};

/// A market the ledger keeps balances for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Dense id assigned at registration.
    pub id: MarketId,
    /// Token the market settles in. For an isolation-mode market this is the
    /// vault factory's address.
    pub token: Address,
    /// Balances of this market must be held by per-owner vaults.
    pub is_isolation_mode: bool,
    /// Whether balances may go negative.
    pub allows_borrowing: bool,
}
