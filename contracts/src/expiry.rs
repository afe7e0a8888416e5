//! Expiry collaborator.
//!
//! Records, per `(account, market)`, the time after which a borrow may be
//! closed out by a third party. Setting an expiry only makes sense while the
//! account owes the market: a non-negative balance clears it instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use margin_protocol::ledger::MarginLedger;
use margin_protocol::{Account, Address, MarketId, Timestamp};

use crate::error::SettlementError;
use crate::events::Event;
use crate::MarginSystem;

/// Errors raised by the expiry collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpiryError {
    #[error("unknown market {0}")]
    UnknownMarket(MarketId),

    /// `now + time_delta` does not fit in a timestamp.
    #[error("expiry overflow: {now} + {time_delta}")]
    Overflow { now: Timestamp, time_delta: u64 },
}

/// Expiry book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    address: Address,
    #[serde(with = "entries")]
    expiries: BTreeMap<(Account, MarketId), Timestamp>,
}

/// One serialized expiry. Tuple keys have no string form, so the book is
/// written as a list of these.
#[derive(Serialize, Deserialize)]
struct ExpiryEntry {
    account: Account,
    market_id: MarketId,
    expiry: Timestamp,
}

mod entries {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(Account, MarketId), Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter().map(|((account, market_id), expiry)| ExpiryEntry {
            account: *account,
            market_id: *market_id,
            expiry: *expiry,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(Account, MarketId), Timestamp>, D::Error> {
        let list = Vec::<ExpiryEntry>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|e| ((e.account, e.market_id), e.expiry))
            .collect())
    }
}

impl Expiry {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            expiries: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Expiry of `account` in `market`, if one is set.
    pub fn get_expiry(&self, account: &Account, market: MarketId) -> Option<Timestamp> {
        self.expiries.get(&(*account, market)).copied()
    }

    /// Applies `time_delta` to `(account, market)`.
    ///
    /// A zero delta changes nothing and returns `Ok(None)`. Otherwise the
    /// expiry becomes `now + time_delta` when the account's balance is
    /// negative, and is cleared when it is not. Returns the new expiry.
    pub fn set_expiry(
        &mut self,
        ledger: &MarginLedger,
        account: Account,
        market: MarketId,
        time_delta: u64,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, ExpiryError> {
        if !ledger.is_market(market) {
            return Err(ExpiryError::UnknownMarket(market));
        }
        if time_delta == 0 {
            return Ok(self.get_expiry(&account, market));
        }
        if ledger.get_account_balance(&account, market) < 0 {
            let at = now
                .checked_add(time_delta)
                .ok_or(ExpiryError::Overflow { now, time_delta })?;
            self.expiries.insert((account, market), at);
            Ok(Some(at))
        } else {
            self.expiries.remove(&(account, market));
            Ok(None)
        }
    }
}

impl MarginSystem {
    /// Forwards expiry parameters of a position-modifying swap. A zero
    /// delta is a no-op.
    pub(crate) fn apply_expiry(
        &mut self,
        account: Account,
        market: MarketId,
        time_delta: u64,
    ) -> Result<(), SettlementError> {
        if time_delta == 0 {
            return Ok(());
        }
        let now = self.now();
        let expiry = self
            .expiry
            .set_expiry(&self.ledger, account, market, time_delta, now)?;
        debug!(account = %account, market, ?expiry, "expiry set");
        self.emit(Event::ExpirySet {
            account,
            market_id: market,
            expiry,
        });
        Ok(())
    }
}
