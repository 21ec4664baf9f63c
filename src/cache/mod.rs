//! Prepared statement cache.
//!
//! One instance per connection pool, shared by all of the pool's
//! connections. Statements are cached per `(connection, method, args)`
//! key and borrowed by at most one caller at a time; when the cache is
//! full or a key is contended, callers get a freshly prepared statement
//! that is closed on restore instead of pooled.

pub mod entry;
pub mod error;
pub mod key;
mod map;

pub use entry::{Prepared, State};
pub use error::Error;
pub use key::{ConnectionId, PrepareArg, PrepareMethod, StatementKey};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::statement::{self, Statement};
use map::BoundedMap;

/// Cache statistics.
#[derive(Default, Debug, Copy, Clone)]
pub struct Stats {
    /// Retrieves served from the cache.
    pub hits: u64,
    /// Retrieves that prepared a fresh statement.
    pub misses: u64,
    /// Entries evicted to stay under the size limit.
    pub evictions: u64,
    /// Current number of cached statements.
    pub size: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Bounded cache of prepared statements.
///
/// All operations are safe to call from any thread. Nothing blocks: the
/// only waiting a caller ever does is inside its own prepare callback or
/// the statement's close, and the cache holds no lock across either.
pub struct StatementCache<S: Statement> {
    map: BoundedMap<StatementKey, Prepared<S>>,
    counters: Arc<Counters>,
}

impl<S: Statement> StatementCache<S> {
    /// New cache holding at most `max_size` statements.
    ///
    /// `max_size` of zero is rejected: a pool that wants no caching
    /// should not construct a cache at all (see
    /// [`CacheConfig::build`](crate::config::CacheConfig::build)).
    pub fn new(max_size: usize) -> Result<Self, Error> {
        if max_size == 0 {
            return Err(Error::MaxSizeZero);
        }

        let counters = Arc::new(Counters::default());
        let stats = Arc::clone(&counters);
        let map: BoundedMap<StatementKey, Prepared<S>> = BoundedMap::new(
            max_size,
            Box::new(move |key, entry| {
                // Whoever loses the race to AVAILABLE closes the
                // statement: an available entry is closed here, a
                // borrowed one by its borrower on restore.
                if entry.mark_evicted() == State::Available {
                    statement::close(entry.statement());
                }
                stats.evictions.fetch_add(1, Ordering::Relaxed);
                trace!("evicted statement for {}", key);
            }),
        );

        Ok(Self { map, counters })
    }

    /// Retrieve a statement for the key, preparing a fresh one on a miss.
    ///
    /// The returned entry belongs to the caller until the matching
    /// [`restore`](Self::restore). On a miss the prepare callback runs
    /// with no cache lock held; its error propagates unchanged and leaves
    /// the cache untouched. Only the first concurrent inserter of a key
    /// gets the cached slot, everyone else gets an uncached entry.
    pub fn retrieve<F, E>(&self, key: StatementKey, prepare: F) -> Result<Arc<Prepared<S>>, E>
    where
        F: FnOnce() -> Result<S, E>,
    {
        let existing = self.map.get(&key);
        if let Some(entry) = &existing {
            if entry.try_acquire() {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                trace!("using cached statement for {}", key);
                return Ok(Arc::clone(entry));
            }
        }

        // Miss: no entry for the key, or the entry is borrowed or evicted.
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let fresh = prepare()?;

        if existing.is_none() {
            match self.map.put_if_absent(key, Prepared::cached(fresh)) {
                Ok(inserted) => return Ok(inserted),
                // Another thread inserted the key first.
                Err(candidate) => return Ok(Arc::new(candidate.into_uncached())),
            }
        }

        Ok(Arc::new(Prepared::uncached(fresh)))
    }

    /// Return a borrowed entry.
    ///
    /// Must be called exactly once per successful retrieve. Cached entries
    /// go back in the pool; uncached entries and entries evicted
    /// mid-borrow have their statement closed here. With `clear` set,
    /// pending warnings are reset first, best effort.
    pub fn restore(&self, entry: Arc<Prepared<S>>, clear: bool) {
        if !entry.is_cached() {
            statement::close(entry.statement());
            return;
        }

        if clear {
            statement::clear_warnings(entry.statement());
        }

        if entry.try_release() {
            return;
        }

        match entry.state() {
            // Evicted while borrowed; the borrower closes.
            Some(State::Evicted) => statement::close(entry.statement()),
            state => warn!("statement restored twice (state {:?})", state),
        }
    }

    /// Forget the entry holding this exact statement, closing the
    /// statement when `close` is set. Returns false for unknown
    /// statements. Used to purge a statement the caller has seen fail.
    ///
    /// `close = false` drops cache tracking while leaving the statement
    /// open; an escape hatch for callers taking over the handle.
    pub fn remove(&self, statement: &S, close: bool) -> bool {
        for (key, entry) in self.map.entries() {
            // Compared by address: two prepares of the same SQL are
            // distinct server-side objects.
            if std::ptr::eq(entry.statement(), statement) {
                if !self.map.remove_if_same(&key, &entry) {
                    return false;
                }
                if close {
                    statement::close(entry.statement());
                }
                return true;
            }
        }

        false
    }

    /// Remove and close every statement cached for the connection,
    /// returning how many there were. Called when the pool destroys the
    /// connection: no entry may outlive the connection it was prepared on.
    pub fn remove_all(&self, connection: ConnectionId) -> usize {
        let mut removed = 0;
        for (key, entry) in self.map.entries() {
            if key.connection() == connection && self.map.remove_if_same(&key, &entry) {
                statement::close(entry.statement());
                removed += 1;
            }
        }

        if removed > 0 {
            trace!("removed {} statements for connection {}", removed, connection);
        }

        removed
    }

    /// Remove and close everything. Pool shutdown.
    pub fn clear(&self) {
        for (key, entry) in self.map.entries() {
            if self.map.remove_if_same(&key, &entry) {
                statement::close(entry.statement());
            }
        }
    }

    /// Number of cached statements.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Configured size limit.
    pub fn max_size(&self) -> usize {
        self.map.capacity()
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> Stats {
        Stats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            size: self.map.len(),
        }
    }
}

impl<S: Statement> Drop for StatementCache<S> {
    fn drop(&mut self) {
        // A pool that shut down cleanly already cleared; this catches the
        // rest so no statement outlives the cache unclosed.
        self.clear();
    }
}

impl<S: Statement> fmt::Debug for StatementCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCache")
            .field("size", &self.map.len())
            .field("max_size", &self.map.capacity())
            .finish_non_exhaustive()
    }
}
