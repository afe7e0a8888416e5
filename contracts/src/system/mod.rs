//! # Margin System
//!
//! [`MarginSystem`] is the whole settlement environment in one owned value:
//! the ledger store, the token bank, every vault factory and proxy, the
//! registered liquidity sources and converters, the expiry and
//! borrow-position collaborators, a clock and an event log.
//!
//! Contracts call each other synchronously. A ledger operation that pulls
//! wrapped shares calls the factory's token hook, which calls the vault
//! implementation, which moves underlying in the token bank. Keeping all of
//! that in one value lets those callbacks take `&mut MarginSystem` instead of
//! juggling shared mutable handles. Trait objects for pluggable components
//! are held as `Arc`s: the handle is cloned out of the registry before the
//! component is invoked with `&mut self`.
//!
//! ## Atomicity
//!
//! Public entry points that change state run inside
//! [`MarginSystem::atomically`], which snapshots the system and restores the
//! snapshot if the call fails. A failed call therefore leaves balances,
//! queues and the event log exactly as they were.

mod operate;
mod tokens;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use margin_protocol::config::SystemConfig;
use margin_protocol::ledger::{LedgerError, MarginLedger};
use margin_protocol::token::{TokenBank, TokenError};
use margin_protocol::{Address, MarketId, Timestamp};

use crate::borrow_position::BorrowPositionProxy;
use crate::error::SettlementError;
use crate::events::{Event, EventRecord};
use crate::expiry::Expiry;
use crate::isolation::{FactoryError, VaultError, VaultFactory, VaultImplementation, VaultProxy};
use crate::reentrancy::{Guarded, ReentrancyGuard};
use crate::traders::{AutoTrader, ExchangeWrapper, LedgerCallee, TokenConverter};

/// The settlement environment.
#[derive(Debug, Clone)]
pub struct MarginSystem {
    config: SystemConfig,
    pub(crate) ledger: MarginLedger,
    pub(crate) tokens: TokenBank,
    pub(crate) factories: BTreeMap<Address, VaultFactory>,
    pub(crate) vaults: BTreeMap<Address, VaultProxy>,
    pub(crate) implementations: BTreeMap<Address, Arc<dyn VaultImplementation>>,
    pub(crate) exchange_wrappers: BTreeMap<Address, Arc<dyn ExchangeWrapper>>,
    pub(crate) auto_traders: BTreeMap<Address, Arc<dyn AutoTrader>>,
    pub(crate) callees: BTreeMap<Address, Arc<dyn LedgerCallee>>,
    pub(crate) converters: BTreeMap<Address, Arc<dyn TokenConverter>>,
    pub(crate) trusted_internal_traders: BTreeSet<Address>,
    pub(crate) expiry: Expiry,
    pub(crate) borrow_positions: BorrowPositionProxy,
    guard: ReentrancyGuard,
    clock: DateTime<Utc>,
    events: Vec<EventRecord>,
}

impl Default for MarginSystem {
    fn default() -> Self {
        Self::new(SystemConfig::default())
    }
}

impl Guarded for MarginSystem {
    fn reentrancy_guard(&mut self) -> &mut ReentrancyGuard {
        &mut self.guard
    }
}

impl MarginSystem {
    /// A fresh system. The generic trader and the borrow-position proxy are
    /// registered as global operators of the ledger.
    pub fn new(config: SystemConfig) -> Self {
        let mut ledger = MarginLedger::new(config.ledger);
        ledger.set_global_operator(config.generic_trader, true);
        ledger.set_global_operator(config.borrow_position_proxy, true);

        info!(
            ledger = %config.ledger,
            governance = %config.governance,
            generic_trader = %config.generic_trader,
            max_path_length = config.max_path_length,
            "margin system created"
        );

        Self {
            expiry: Expiry::new(config.expiry),
            borrow_positions: BorrowPositionProxy::new(config.borrow_position_proxy),
            config,
            ledger,
            tokens: TokenBank::new(),
            factories: BTreeMap::new(),
            vaults: BTreeMap::new(),
            implementations: BTreeMap::new(),
            exchange_wrappers: BTreeMap::new(),
            auto_traders: BTreeMap::new(),
            callees: BTreeMap::new(),
            converters: BTreeMap::new(),
            trusted_internal_traders: BTreeSet::new(),
            guard: ReentrancyGuard::new(),
            clock: Utc::now(),
            events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Address the ledger acts under.
    pub fn ledger_address(&self) -> Address {
        self.config.ledger
    }

    pub fn governance(&self) -> Address {
        self.config.governance
    }

    pub fn generic_trader_address(&self) -> Address {
        self.config.generic_trader
    }

    /// Read access to the ledger store.
    pub fn ledger(&self) -> &MarginLedger {
        &self.ledger
    }

    /// Read access to the token bank.
    pub fn tokens(&self) -> &TokenBank {
        &self.tokens
    }

    /// Write access to the token bank, for wallets and liquidity sources
    /// moving their own tokens.
    pub fn tokens_mut(&mut self) -> &mut TokenBank {
        &mut self.tokens
    }

    pub fn factory(&self, factory: &Address) -> Result<&VaultFactory, FactoryError> {
        self.factories
            .get(factory)
            .ok_or(FactoryError::UnknownFactory(*factory))
    }

    pub(crate) fn factory_mut(
        &mut self,
        factory: &Address,
    ) -> Result<&mut VaultFactory, FactoryError> {
        self.factories
            .get_mut(factory)
            .ok_or(FactoryError::UnknownFactory(*factory))
    }

    /// Whether `token` is the share token of a vault factory.
    pub fn is_vault_factory(&self, token: &Address) -> bool {
        self.factories.contains_key(token)
    }

    pub fn factories(&self) -> impl Iterator<Item = &VaultFactory> {
        self.factories.values()
    }

    pub fn vault(&self, vault: &Address) -> Result<&VaultProxy, VaultError> {
        self.vaults.get(vault).ok_or(VaultError::NotAVault(*vault))
    }

    /// The registered converter at `address`, if any.
    pub fn converter(&self, address: &Address) -> Option<Arc<dyn TokenConverter>> {
        self.converters.get(address).cloned()
    }

    pub fn is_trusted_internal_trader(&self, trader: &Address) -> bool {
        self.trusted_internal_traders.contains(trader)
    }

    pub fn expiry(&self) -> &Expiry {
        &self.expiry
    }

    pub fn borrow_positions(&self) -> &BorrowPositionProxy {
        &self.borrow_positions
    }

    pub fn is_reentrancy_locked(&self) -> bool {
        self.guard.is_entered()
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Current block time in seconds.
    pub fn now(&self) -> Timestamp {
        u64::try_from(self.clock.timestamp()).unwrap_or(0)
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    /// Moves the clock forward.
    pub fn advance_time(&mut self, by: Duration) {
        self.clock += by;
    }

    // -----------------------------------------------------------------------
    // Events & atomicity
    // -----------------------------------------------------------------------

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub(crate) fn emit(&mut self, event: Event) {
        debug!(event = event.name(), sequence = self.events.len(), "event");
        let record = EventRecord {
            sequence: self.events.len() as u64,
            recorded_at: self.clock,
            event,
        };
        self.events.push(record);
    }

    /// Runs `f` and rolls every change back if it fails.
    ///
    /// The event log is append-only, so it stays out of the snapshot and is
    /// truncated back to its length on entry instead.
    pub fn atomically<T, F>(&mut self, f: F) -> Result<T, SettlementError>
    where
        F: FnOnce(&mut Self) -> Result<T, SettlementError>,
    {
        let events = std::mem::take(&mut self.events);
        let mark = events.len();
        let snapshot = self.clone();
        self.events = events;

        let result = f(self);
        if result.is_err() {
            let mut events = std::mem::replace(self, snapshot).events;
            events.truncate(mark);
            self.events = events;
        }
        result
    }

    // -----------------------------------------------------------------------
    // Governance
    // -----------------------------------------------------------------------

    pub(crate) fn require_governance(&self, caller: &Address) -> Result<(), SettlementError> {
        if *caller != self.config.governance {
            return Err(SettlementError::OnlyGovernance(*caller));
        }
        Ok(())
    }

    /// Adds an ordinary market for a token already registered in the bank.
    pub fn add_market(
        &mut self,
        caller: Address,
        token: Address,
        allows_borrowing: bool,
    ) -> Result<MarketId, SettlementError> {
        self.require_governance(&caller)?;
        if !self.tokens.contains(&token) {
            return Err(TokenError::TokenNotFound(token).into());
        }
        let market_id = self.ledger.add_market(token, false, allows_borrowing)?;
        info!(market_id, token = %token, allows_borrowing, "market added");
        self.emit(Event::MarketAdded {
            market_id,
            token,
            is_isolation_mode: false,
        });
        Ok(market_id)
    }

    /// Deploys a vault factory at `factory` for `underlying_token` and adds
    /// its isolation-mode market. The factory starts uninitialized.
    pub fn add_isolation_market(
        &mut self,
        caller: Address,
        factory: Address,
        underlying_token: Address,
        implementation: Address,
    ) -> Result<MarketId, SettlementError> {
        self.require_governance(&caller)?;
        if factory.is_zero() {
            return Err(FactoryError::ZeroAddress("factory").into());
        }
        if !self.tokens.contains(&underlying_token) {
            return Err(TokenError::TokenNotFound(underlying_token).into());
        }
        if !self.implementations.contains_key(&implementation) {
            return Err(VaultError::UnknownImplementation(implementation).into());
        }
        self.atomically(|sys| {
            let market_id = sys.ledger.add_market(factory, true, false)?;
            sys.factories.insert(
                factory,
                VaultFactory::new(factory, market_id, underlying_token, implementation),
            );
            // Factories deposit and withdraw on behalf of their vaults.
            sys.ledger.set_global_operator(factory, true);
            info!(
                market_id,
                factory = %factory,
                underlying = %underlying_token,
                "isolation market added"
            );
            sys.emit(Event::MarketAdded {
                market_id,
                token: factory,
                is_isolation_mode: true,
            });
            Ok(market_id)
        })
    }

    pub fn set_market_allows_borrowing(
        &mut self,
        caller: Address,
        market_id: MarketId,
        allows: bool,
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        self.ledger.set_allows_borrowing(market_id, allows)?;
        Ok(())
    }

    pub fn set_global_operator(
        &mut self,
        caller: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        self.ledger.set_global_operator(operator, approved);
        info!(operator = %operator, approved, "global operator set");
        Ok(())
    }

    /// `caller` approves or revokes `operator` for all of its own accounts.
    pub fn set_operator(&mut self, caller: Address, operator: Address, approved: bool) {
        self.ledger.set_operator(caller, operator, approved);
        debug!(owner = %caller, operator = %operator, approved, "local operator set");
    }

    pub fn set_trusted_internal_trader(
        &mut self,
        caller: Address,
        trader: Address,
        trusted: bool,
    ) -> Result<(), SettlementError> {
        self.require_governance(&caller)?;
        if trader.is_zero() {
            return Err(LedgerError::UnknownCounterparty(trader).into());
        }
        if trusted {
            self.trusted_internal_traders.insert(trader);
        } else {
            self.trusted_internal_traders.remove(&trader);
        }
        info!(trader = %trader, trusted, "internal trader trust set");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Component registration
    // -----------------------------------------------------------------------

    pub fn register_vault_implementation<V>(
        &mut self,
        caller: Address,
        address: Address,
        implementation: V,
    ) -> Result<(), SettlementError>
    where
        V: VaultImplementation + 'static,
    {
        self.require_governance(&caller)?;
        if address.is_zero() {
            return Err(FactoryError::ZeroAddress("vault implementation").into());
        }
        debug!(address = %address, name = implementation.name(), "vault implementation registered");
        self.implementations.insert(address, Arc::new(implementation));
        Ok(())
    }

    pub fn register_exchange_wrapper<W>(
        &mut self,
        caller: Address,
        address: Address,
        wrapper: W,
    ) -> Result<(), SettlementError>
    where
        W: ExchangeWrapper + 'static,
    {
        self.require_governance(&caller)?;
        debug!(address = %address, "exchange wrapper registered");
        self.exchange_wrappers.insert(address, Arc::new(wrapper));
        Ok(())
    }

    pub fn register_auto_trader<T>(
        &mut self,
        caller: Address,
        address: Address,
        trader: T,
    ) -> Result<(), SettlementError>
    where
        T: AutoTrader + 'static,
    {
        self.require_governance(&caller)?;
        debug!(address = %address, "auto trader registered");
        self.auto_traders.insert(address, Arc::new(trader));
        Ok(())
    }

    /// Registers a token converter. It doubles as an exchange wrapper (for
    /// `Sell` legs) and a callee (for the unwrap `Call`). Trust is granted
    /// separately, per factory.
    pub fn register_converter<C>(
        &mut self,
        caller: Address,
        address: Address,
        converter: C,
    ) -> Result<(), SettlementError>
    where
        C: TokenConverter + 'static,
    {
        self.require_governance(&caller)?;
        let converter = Arc::new(converter);
        debug!(
            address = %address,
            factory = %converter.vault_factory(),
            "token converter registered"
        );
        self.exchange_wrappers.insert(address, converter.clone());
        self.callees.insert(address, converter.clone());
        self.converters.insert(address, converter);
        Ok(())
    }
}
