//! Connection factory keyed by database name

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbmon_core::{Connection, ConnectionFactory, Result};

use crate::config::PostgresConfig;
use crate::connection::PostgresConnection;

/// Opens one PostgreSQL session per requested database on a single server
#[derive(Debug, Clone)]
pub struct PostgresConnectionFactory {
    config: PostgresConfig,
}

impl PostgresConnectionFactory {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    async fn create(&self, key: &str, ttl: Duration) -> Result<Arc<dyn Connection>> {
        tracing::debug!(
            database = key,
            ttl_ms = ttl.as_millis() as u64,
            "opening pooled PostgreSQL connection"
        );
        let connection = PostgresConnection::connect(&self.config, key).await?;
        Ok(Arc::new(connection))
    }
}
