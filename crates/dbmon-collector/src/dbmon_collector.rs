//! Health collector for the databases of one PostgreSQL server
//!
//! Reads a [`CollectorConfig`], keeps one pooled connection per database in a
//! [`dbmon_connection::ConnectionPool`], and pings every database on a fixed
//! interval.

mod collector;
mod config;
pub mod logging;

pub use collector::{Collector, DatabaseFailure, RoundReport};
pub use config::{CollectorConfig, CollectorSettings, LogSettings, PASSWORD_ENV};
