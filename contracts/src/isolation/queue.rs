//! # Transfer Queue
//!
//! The ledger moves wrapped tokens with plain `transfer`/`transfer_from`
//! calls that carry no notion of *which vault* the tokens belong to. Before
//! any such movement, a trusted party writes the intended movement into the
//! queue; the factory's token hook then accepts exactly that movement, once.
//!
//! ## Cursor
//!
//! The cursor starts at 0, meaning "nothing queued". Every enqueue advances
//! it by one and writes the new entry at the new cursor, so entry `n` is the
//! `n`-th movement ever queued. Only the entry at the current cursor can be
//! consumed; older entries are history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use margin_protocol::{Address, Wei};

/// A movement of wrapped tokens announced ahead of time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTransfer {
    /// Expected sender of the token movement.
    pub from: Address,
    /// Expected recipient of the token movement.
    pub to: Address,
    /// Expected amount.
    pub amount: Wei,
    /// Vault whose underlying backs the movement.
    pub vault: Address,
    /// Set once the token hook has accepted the movement.
    pub is_executed: bool,
}

impl QueuedTransfer {
    /// A fresh, unexecuted entry.
    pub fn new(from: Address, to: Address, amount: Wei, vault: Address) -> Self {
        Self {
            from,
            to,
            amount,
            vault,
            is_executed: false,
        }
    }
}

/// Append-only queue of announced movements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferQueue {
    cursor: u64,
    entries: BTreeMap<u64, QueuedTransfer>,
}

impl TransferQueue {
    /// An empty queue with cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor. 0 until the first enqueue.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Advances the cursor and writes `transfer` at the new position.
    pub fn enqueue(&mut self, transfer: QueuedTransfer) -> u64 {
        self.cursor += 1;
        self.entries.insert(self.cursor, transfer);
        self.cursor
    }

    /// The entry at the current cursor, if any.
    pub fn current(&self) -> Option<&QueuedTransfer> {
        self.entries.get(&self.cursor)
    }

    /// Marks the entry at the current cursor executed. Returns `false` when
    /// there is no entry there or it was already executed.
    pub fn mark_current_executed(&mut self) -> bool {
        match self.entries.get_mut(&self.cursor) {
            Some(entry) if !entry.is_executed => {
                entry.is_executed = true;
                true
            }
            _ => false,
        }
    }

    /// The entry written at `cursor`. `None` for 0 and for anything past the
    /// current cursor.
    pub fn get(&self, cursor: u64) -> Option<&QueuedTransfer> {
        if cursor == 0 || cursor > self.cursor {
            return None;
        }
        self.entries.get(&cursor)
    }

    /// Number of entries ever queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` before the first enqueue.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
