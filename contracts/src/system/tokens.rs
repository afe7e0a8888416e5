//! Token movements issued by the ledger.
//!
//! The ledger only knows a market's token address. Ordinary tokens live in
//! the token bank; a vault factory's address is its own share token, so any
//! movement of it is routed through the factory's token hook with the
//! ledger as caller.

use margin_protocol::{Address, Wei};

use super::MarginSystem;
use crate::error::SettlementError;

impl MarginSystem {
    /// The ledger sends `amount` of `token` to `to`.
    pub(crate) fn ledger_push(
        &mut self,
        token: &Address,
        to: &Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let ledger = self.ledger_address();
        if self.is_vault_factory(token) {
            return self.transfer_vault_shares(ledger, *token, *to, amount);
        }
        self.tokens.transfer(token, &ledger, to, amount)?;
        Ok(())
    }

    /// The ledger pulls `amount` of `token` from `from`, spending the
    /// allowance `from` granted it.
    pub(crate) fn ledger_pull(
        &mut self,
        token: &Address,
        from: &Address,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        let ledger = self.ledger_address();
        if self.is_vault_factory(token) {
            return self.transfer_vault_shares_from(ledger, *token, *from, ledger, amount);
        }
        self.tokens.transfer_from(token, &ledger, from, &ledger, amount)?;
        Ok(())
    }
}
