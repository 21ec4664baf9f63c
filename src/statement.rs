//! Contract between the cache and raw prepared statements.
//!
//! The cache never talks to the database API directly. The pool's proxy
//! layer supplies a prepare callback per [`StatementCache::retrieve`] call
//! and implements this trait for its raw handle type.
//!
//! [`StatementCache::retrieve`]: crate::cache::StatementCache::retrieve

use std::fmt::Display;

use tracing::debug;

/// A raw prepared statement handle.
///
/// The cache owns cached handles and guarantees `close` is invoked at most
/// once per handle. `clear_warnings` is a best-effort reset of per-use
/// scratch state, called when a borrower returns a cached handle with the
/// clear flag set.
pub trait Statement: 'static {
    type Error: Display;

    /// Close the server-side statement object.
    fn close(&self) -> Result<(), Self::Error>;

    /// Reset pending warnings and other per-use scratch state.
    fn clear_warnings(&self) -> Result<(), Self::Error>;
}

/// Close a statement, swallowing errors. A statement that fails to close
/// is gone as far as the cache is concerned.
pub(crate) fn close<S: Statement>(statement: &S) {
    if let Err(err) = statement.close() {
        debug!("couldn't close statement: {}", err);
    }
}

/// Clear statement warnings, swallowing errors.
pub(crate) fn clear_warnings<S: Statement>(statement: &S) {
    if let Err(err) = statement.clear_warnings() {
        debug!("couldn't clear statement warnings: {}", err);
    }
}
