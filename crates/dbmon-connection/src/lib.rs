//! dbmon Connection - Connection lifecycle management
//!
//! This crate keeps one cached connection per monitored database and reclaims
//! idle ones so that server-side sessions are never leaked.

pub mod pool;

pub use pool::{ConnectionPool, PoolConfig, PoolStats, PrunerHandle};
