//! Prepared statement cache for database connection pools.
//!
//! Preparing a statement costs a network round trip plus a server-side
//! parse and plan. The cache memoizes prepared handles per connection so
//! repeated prepares of the same query reuse the server-side object,
//! while guaranteeing a handle is only ever borrowed by one caller at a
//! time and closed exactly once.

pub mod cache;
pub mod config;
pub mod statement;

pub use cache::{
    ConnectionId, Error, PrepareArg, PrepareMethod, Prepared, State, StatementCache, StatementKey,
    Stats,
};
pub use config::CacheConfig;
pub use statement::Statement;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use std::io::IsTerminal;

/// Setup the logger, so `info!`, `debug!`
/// and other macros actually output something.
///
/// Using try_init and ignoring errors to allow
/// for use in tests (setting up multiple times).
pub fn logger() {
    let format = fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_file(false);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .try_init();
}
