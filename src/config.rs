//! Statement cache settings.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{Error, StatementCache};
use crate::statement::Statement;

/// Advisory ceiling for [`CacheConfig::max_size`]. Larger caches work but
/// pin that many statements on the server; the pool is probably
/// misconfigured.
pub const RECOMMENDED_MAX_SIZE: usize = 1000;

/// Statement cache settings, one section per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached statements across the pool's connections.
    /// `0` disables statement caching.
    pub max_size: usize,
}

impl CacheConfig {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Is statement caching on?
    pub fn enabled(&self) -> bool {
        self.max_size > 0
    }

    /// Build the cache, or `None` when caching is disabled. A pool
    /// without a cache bypasses it entirely and closes every statement
    /// after use.
    pub fn build<S: Statement>(&self) -> Result<Option<StatementCache<S>>, Error> {
        if !self.enabled() {
            return Ok(None);
        }

        if self.max_size > RECOMMENDED_MAX_SIZE {
            warn!(
                "statement cache size {} exceeds the recommended maximum {}",
                self.max_size, RECOMMENDED_MAX_SIZE
            );
        }

        StatementCache::new(self.max_size).map(Some)
    }
}
