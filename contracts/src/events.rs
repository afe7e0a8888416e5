//! Event log.
//!
//! Every state transition worth observing appends an [`Event`] to the
//! system's log. The log is part of the system state, so a failed call that
//! is rolled back leaves no events behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use margin_protocol::{Account, Address, MarketId, Timestamp, Wei};

use crate::generic_trader::{EventType, SwapReceipt};
use crate::isolation::QueuedTransfer;

/// Something that happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A market was added to the ledger.
    MarketAdded {
        market_id: MarketId,
        token: Address,
        is_isolation_mode: bool,
    },
    /// A vault factory finished its one-time setup.
    Initialized {
        factory: Address,
        converters: Vec<Address>,
    },
    VaultCreated {
        factory: Address,
        owner: Address,
        vault: Address,
    },
    TokenConverterSet {
        factory: Address,
        converter: Address,
        trusted: bool,
    },
    UserVaultImplementationSet {
        factory: Address,
        previous: Address,
        implementation: Address,
    },
    TransferQueued {
        factory: Address,
        cursor: u64,
        transfer: QueuedTransfer,
    },
    TransferExecuted {
        factory: Address,
        cursor: u64,
        from: Address,
        to: Address,
        amount: Wei,
    },
    /// A generic trader swap settled.
    SwapExecuted {
        receipt: SwapReceipt,
        event_type: EventType,
    },
    ExpirySet {
        account: Account,
        market_id: MarketId,
        expiry: Option<Timestamp>,
    },
    BorrowPositionCallerSet {
        caller: Address,
        authorized: bool,
    },
}

impl Event {
    /// Short name, used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Event::MarketAdded { .. } => "market_added",
            Event::Initialized { .. } => "initialized",
            Event::VaultCreated { .. } => "vault_created",
            Event::TokenConverterSet { .. } => "token_converter_set",
            Event::UserVaultImplementationSet { .. } => "user_vault_implementation_set",
            Event::TransferQueued { .. } => "transfer_queued",
            Event::TransferExecuted { .. } => "transfer_executed",
            Event::SwapExecuted { .. } => "swap_executed",
            Event::ExpirySet { .. } => "expiry_set",
            Event::BorrowPositionCallerSet { .. } => "borrow_position_caller_set",
        }
    }
}

/// An event with its position and time in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 0-based position in the log.
    pub sequence: u64,
    /// System clock when the event was recorded.
    pub recorded_at: DateTime<Utc>,
    pub event: Event,
}
