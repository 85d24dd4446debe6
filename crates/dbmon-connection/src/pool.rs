//! Keyed connection pooling with idle TTLs
//!
//! The pool caches at most one connection per key (a database name), opened
//! on demand through a [`ConnectionFactory`](dbmon_core::ConnectionFactory).
//! Every lookup refreshes the entry's idle deadline; expired entries are
//! closed by an explicit prune sweep, on the next lookup for that key, or by
//! an optional background pruner.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use dbmon_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let pool = ConnectionPool::new(PoolConfig::default(), factory);
//! let conn = pool.get_connection("orders", Duration::from_secs(90)).await?;
//! conn.ping().await?;
//!
//! pool.prune_connections().await;
//! assert!(pool.close_all_connections().await);
//! ```

mod config;
mod entry;
#[allow(clippy::module_inception)]
mod pool;
mod pruner;
mod stats;


pub use config::PoolConfig;
pub use pool::ConnectionPool;
pub use pruner::PrunerHandle;
pub use stats::PoolStats;
