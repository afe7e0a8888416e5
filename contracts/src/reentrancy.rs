//! Non-reentrancy guard for the trader entry points.
//!
//! A guarded entry point runs inside [`ReentrancyGuard::scoped`]. While it
//! runs, any nested attempt to enter a guarded entry point on the same state
//! fails immediately. The guard is released on every exit path, success or
//! failure, but only by the call that acquired it.

use serde::{Deserialize, Serialize};

/// Types that carry a [`ReentrancyGuard`].
pub trait Guarded {
    /// Mutable access to the guard.
    fn reentrancy_guard(&mut self) -> &mut ReentrancyGuard;
}

/// Marker error: the guard is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReentrantCall;

/// Single-flag mutex for synchronous re-entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReentrancyGuard {
    entered: bool,
}

impl ReentrancyGuard {
    /// Creates a released guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a guarded call is in progress.
    pub fn is_entered(&self) -> bool {
        self.entered
    }

    fn acquire(&mut self) -> Result<(), ReentrantCall> {
        if self.entered {
            return Err(ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    fn release(&mut self) {
        self.entered = false;
    }

    /// Runs `f` while holding the guard of `state`.
    pub fn scoped<S, T, E, F>(state: &mut S, f: F) -> Result<T, E>
    where
        S: Guarded,
        E: From<ReentrantCall>,
        F: FnOnce(&mut S) -> Result<T, E>,
    {
        state.reentrancy_guard().acquire()?;
        let result = f(state);
        state.reentrancy_guard().release();
        result
    }
}
