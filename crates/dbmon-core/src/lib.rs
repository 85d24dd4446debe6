//! dbmon Core - Core abstractions shared by the dbmon crates
//!
//! This crate defines:
//!
//! - `Connection` - Trait for a live database session
//! - `ConnectionFactory` - Trait for opening sessions on demand
//! - `DbmonError` / `Result` - The common error type

mod connection;
mod error;

pub use connection::*;
pub use error::*;
