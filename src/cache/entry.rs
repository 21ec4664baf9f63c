//! Cache entries and their lifecycle.
//!
//! A cached entry moves between three states, always by atomic
//! compare-and-set, never under a lock:
//!
//! ```text
//! new entry ──► IN_USE ──► AVAILABLE ──► IN_USE ──► …
//!                  │            │
//!                  │            └──eviction──► EVICTED (evictor closes)
//!                  └──eviction while IN_USE──► EVICTED (borrower closes on restore)
//! ```
//!
//! Entries handed out when the cache could not adopt the statement carry
//! no state at all: they live for exactly one borrow and are closed on
//! restore.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

const AVAILABLE: u8 = 0;
const IN_USE: u8 = 1;
const EVICTED: u8 = 2;

/// Lifecycle state of a cached statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// In the cache, not borrowed. The statement is valid and reusable.
    Available,
    /// Borrowed by exactly one caller.
    InUse,
    /// Removed by eviction. Terminal.
    Evicted,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            AVAILABLE => State::Available,
            IN_USE => State::InUse,
            _ => State::Evicted,
        }
    }
}

/// A prepared statement handed out by the cache.
///
/// Cached entries own their statement until eviction or removal. Uncached
/// entries are the fallback when the cache is full or the key is contended;
/// restoring one closes the statement instead of returning it to the pool.
pub struct Prepared<S> {
    statement: S,
    state: Option<AtomicU8>,
}

impl<S> Prepared<S> {
    /// New cached entry. Born borrowed: the caller that created it holds it.
    pub(crate) fn cached(statement: S) -> Self {
        Self {
            statement,
            state: Some(AtomicU8::new(IN_USE)),
        }
    }

    /// New uncached entry, closed on restore.
    pub(crate) fn uncached(statement: S) -> Self {
        Self {
            statement,
            state: None,
        }
    }

    /// Repackage a cached candidate that lost the insert race.
    pub(crate) fn into_uncached(self) -> Self {
        Self {
            statement: self.statement,
            state: None,
        }
    }

    /// The raw statement. Valid for use only between a successful
    /// [`StatementCache::retrieve`] and the matching `restore`.
    ///
    /// [`StatementCache::retrieve`]: crate::cache::StatementCache::retrieve
    pub fn statement(&self) -> &S {
        &self.statement
    }

    /// Is this entry subject to the cache lifecycle?
    pub fn is_cached(&self) -> bool {
        self.state.is_some()
    }

    /// Current lifecycle state, `None` for uncached entries.
    pub fn state(&self) -> Option<State> {
        self.state
            .as_ref()
            .map(|state| State::from(state.load(Ordering::Acquire)))
    }

    /// Borrow the entry: AVAILABLE → IN_USE. False if it is already
    /// borrowed, evicted, or uncached.
    pub(crate) fn try_acquire(&self) -> bool {
        match &self.state {
            Some(state) => state
                .compare_exchange(AVAILABLE, IN_USE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            None => false,
        }
    }

    /// Return the entry: IN_USE → AVAILABLE. False means the state moved
    /// underneath the borrower, normally to EVICTED.
    pub(crate) fn try_release(&self) -> bool {
        match &self.state {
            Some(state) => state
                .compare_exchange(IN_USE, AVAILABLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            None => false,
        }
    }

    /// Evict the entry, returning the state it was in. EVICTED is terminal:
    /// no transition ever leaves it.
    pub(crate) fn mark_evicted(&self) -> State {
        match &self.state {
            Some(state) => State::from(state.swap(EVICTED, Ordering::AcqRel)),
            // Uncached entries never reach the map, so nothing evicts them.
            None => State::Evicted,
        }
    }
}

impl<S> fmt::Debug for Prepared<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prepared")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
