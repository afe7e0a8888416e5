//! # Protocol Configuration & Constants
//!
//! Every magic number of the settlement layer lives here. Runtime knobs that
//! a deployment may want to change are grouped in [`SystemConfig`]; the rest
//! are compile-time constants.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Wei};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-independent protocol version string, reported by the binary.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Sentinels
// ---------------------------------------------------------------------------

/// Amount sentinel meaning "the account's full current positive balance".
///
/// Accepted as a generic-trader input amount and as a collateral-transfer
/// amount. Never a literal amount.
pub const MAX_AMOUNT_SENTINEL: Wei = u128::MAX;

// ---------------------------------------------------------------------------
// Generic Trader Limits
// ---------------------------------------------------------------------------

/// Minimum number of markets in a trade path (one leg).
pub const MIN_PATH_LENGTH: usize = 2;

/// Default maximum number of markets in a trade path. Seven legs is more
/// than any sane route needs and keeps the per-call work bounded.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 8;

/// Default deadline window used by tooling that does not specify one.
pub const DEFAULT_DEADLINE_WINDOW_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Well-known Components
// ---------------------------------------------------------------------------

/// Label from which the default ledger address is derived.
pub const LEDGER_LABEL: &str = "margin-ledger";

/// Label from which the default governance address is derived.
pub const GOVERNANCE_LABEL: &str = "margin-governance";

/// Label from which the default generic trader address is derived.
pub const GENERIC_TRADER_LABEL: &str = "generic-trader";

/// Label from which the default expiry collaborator address is derived.
pub const EXPIRY_LABEL: &str = "expiry";

/// Label from which the default borrow-position proxy address is derived.
pub const BORROW_POSITION_PROXY_LABEL: &str = "borrow-position-proxy";

// ---------------------------------------------------------------------------
// SystemConfig
// ---------------------------------------------------------------------------

/// Runtime configuration of a settlement system instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Address the ledger acts under when it moves tokens.
    pub ledger: Address,
    /// The only address allowed to call governance setters.
    pub governance: Address,
    /// Address of the generic trader (registered as a global operator).
    pub generic_trader: Address,
    /// Address of the expiry collaborator.
    pub expiry: Address,
    /// Address of the borrow-position proxy (registered as a global operator).
    pub borrow_position_proxy: Address,
    /// Upper bound on `len(market_ids_path)`.
    pub max_path_length: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ledger: Address::from_label(LEDGER_LABEL),
            governance: Address::from_label(GOVERNANCE_LABEL),
            generic_trader: Address::from_label(GENERIC_TRADER_LABEL),
            expiry: Address::from_label(EXPIRY_LABEL),
            borrow_position_proxy: Address::from_label(BORROW_POSITION_PROXY_LABEL),
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_limits_sanity() {
        assert!(MIN_PATH_LENGTH < DEFAULT_MAX_PATH_LENGTH);
    }

    #[test]
    fn default_components_are_distinct() {
        let cfg = SystemConfig::default();
        let all = [
            cfg.ledger,
            cfg.governance,
            cfg.generic_trader,
            cfg.expiry,
            cfg.borrow_position_proxy,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(!a.is_zero());
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: SystemConfig = serde_json::from_str(r#"{"max_path_length": 4}"#).unwrap();
        assert_eq!(cfg.max_path_length, 4);
        assert_eq!(cfg.ledger, SystemConfig::default().ledger);
    }
}
