//! Connection and connection factory traits

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A live session to one database
///
/// Handles are shared (`Arc<dyn Connection>`) between the pool that owns
/// them and the callers that borrow them, so every method takes `&self`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Name of the database this session is bound to
    fn database(&self) -> &str;

    /// Run a minimal round-trip against the server.
    ///
    /// Fails with a connection error when the server has terminated the
    /// session. Callers use this to detect stale handles lazily.
    async fn ping(&self) -> Result<()>;

    /// Close the connection
    ///
    /// Must be safe to call on a session that is already gone; a second call
    /// is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Factory for creating connections on a pool miss
///
/// `key` identifies the target (a database name) and `ttl` is the idle
/// lifetime the pool will grant the connection. Implementations perform the
/// blocking network work (connect, authenticate, TLS) and own their timeouts.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection for `key`
    async fn create(&self, key: &str, ttl: Duration) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self, key: &str, ttl: Duration) -> Result<Arc<dyn Connection>> {
        (**self).create(key, ttl).await
    }
}
