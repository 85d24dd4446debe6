//! PostgreSQL connection implementation

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbmon_core::{Connection, DbmonError, Result};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

use crate::config::PostgresConfig;
use crate::tls::build_tls_connector;

/// How long `close` waits for the driver task to flush the terminate message
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn map_pg_error(error: &tokio_postgres::Error) -> DbmonError {
    if error.is_closed() {
        return DbmonError::Connection(format!("connection closed: {}", error));
    }
    match error.as_db_error() {
        Some(db_error) => DbmonError::Query(format!(
            "{} (code: {})",
            db_error.message(),
            db_error.code().code()
        )),
        None => DbmonError::Connection(error.to_string()),
    }
}

/// A session to one PostgreSQL database
pub struct PostgresConnection {
    database: String,
    backend_pid: Option<i32>,
    client: Mutex<Option<Client>>,
    driver_task: SyncMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PostgresConnection {
    /// Connect to `database` on the server described by `config`
    pub async fn connect(config: &PostgresConfig, database: &str) -> Result<Self> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database,
            ssl_mode = %config.ssl_mode,
            "connecting to PostgreSQL database"
        );

        let pg_config = config.to_pg_config(database);
        let (client, driver_task) = match build_tls_connector(config)? {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await.map_err(|e| {
                    DbmonError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
                })?;
                (client, spawn_driver(database, connection))
            }
            None => {
                let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
                    DbmonError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
                })?;
                (client, spawn_driver(database, connection))
            }
        };

        let backend_pid = match client.query_one("SELECT pg_backend_pid()", &[]).await {
            Ok(row) => row.try_get::<_, i32>(0).ok(),
            Err(e) => {
                tracing::debug!(database, error = %e, "could not read backend pid");
                None
            }
        };

        tracing::info!(database, backend_pid = ?backend_pid, "PostgreSQL connection established");
        Ok(Self {
            database: database.to_string(),
            backend_pid,
            client: Mutex::new(Some(client)),
            driver_task: SyncMutex::new(Some(driver_task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Server process id serving this session, as shown in `pg_stat_activity.pid`
    pub fn backend_pid(&self) -> Option<i32> {
        self.backend_pid
    }
}

fn spawn_driver<F>(database: &str, connection: F) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    let database = database.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(database = %database, error = %e, "PostgreSQL connection error");
        }
    })
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(DbmonError::Closed)?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| map_pg_error(&e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let task = self.driver_task.lock().take();
        let Some(mut task) = task else {
            return Ok(());
        };

        // A ping stuck on a dead socket holds the client lock, so waiting for
        // the lock counts against the timeout too.
        let shutdown = async {
            // Dropping the client makes the driver task send Terminate and exit.
            drop(self.client.lock().await.take());
            (&mut task).await
        };
        let outcome = tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await;
        match outcome {
            Ok(Ok(())) => {
                tracing::debug!(database = %self.database, "closed PostgreSQL connection");
                Ok(())
            }
            Ok(Err(e)) => Err(DbmonError::Connection(format!(
                "PostgreSQL driver task failed: {}",
                e
            ))),
            Err(_) => {
                task.abort();
                Err(DbmonError::Connection(format!(
                    "timed out closing connection to {}",
                    self.database
                )))
            }
        }
    }

    fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        // The driver task ends when the server terminates the session.
        self.driver_task
            .lock()
            .as_ref()
            .is_none_or(|task| task.is_finished())
    }
}
