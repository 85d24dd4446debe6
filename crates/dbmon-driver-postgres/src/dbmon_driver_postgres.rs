//! PostgreSQL connection factory for the dbmon pool
//!
//! One server, many databases: the pool key is the database name and every
//! connection shares the server settings in [`PostgresConfig`].

mod config;
mod connection;
mod factory;
mod tls;

pub use config::{PostgresConfig, SslMode};
pub use connection::PostgresConnection;
pub use factory::PostgresConnectionFactory;
pub use tls::{TlsError, build_tls_connector};
