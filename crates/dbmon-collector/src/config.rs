//! Collector configuration file

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dbmon_connection::PoolConfig;
use dbmon_driver_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `server.password`
pub const PASSWORD_ENV: &str = "DBMON_PASSWORD";

/// Top-level configuration loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub server: PostgresConfig,
    pub pool: PoolConfig,
    pub collector: CollectorSettings,
    pub logging: LogSettings,
}

/// Which databases to check and how often
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Databases checked every round; each is a pool key
    pub databases: Vec<String>,
    /// Databases whose connection is kept open for the process lifetime
    pub persistent_databases: Vec<String>,
    /// Milliseconds between collection rounds
    pub interval_ms: u64,
    /// Idle lifetime granted to each database connection
    pub connection_ttl_ms: u64,
}

impl CollectorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_millis(self.connection_ttl_ms)
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            persistent_databases: Vec::new(),
            interval_ms: 15_000,
            connection_ttl_ms: 60_000,
        }
    }
}

/// Logging section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
    /// Write JSON logs to a daily rolling file in `log_dir`
    pub json: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info,dbmon_collector=info,dbmon_connection=info,dbmon_driver_postgres=info"
                .to_string(),
            json: false,
            log_dir: None,
        }
    }
}

impl CollectorConfig {
    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_toml(&raw)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.server.password = Some(password);
        }
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Every database the collector will touch, regular ones first
    pub fn all_databases(&self) -> impl Iterator<Item = &str> {
        self.collector
            .databases
            .iter()
            .chain(self.collector.persistent_databases.iter())
            .map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.collector.databases.is_empty() && self.collector.persistent_databases.is_empty() {
            bail!("collector.databases must list at least one database");
        }
        if let Some(name) = self.all_databases().find(|name| name.trim().is_empty()) {
            bail!("database names must not be empty (got {:?})", name);
        }
        if self.collector.interval_ms == 0 {
            bail!("collector.interval_ms must be greater than 0");
        }
        if self.pool.prune_interval().is_some_and(|interval| interval.is_zero()) {
            bail!("pool.prune_interval_ms must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbmon_driver_postgres::SslMode;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const FULL_CONFIG: &str = indoc! {r#"
        [server]
        host = "pg.internal"
        port = 6432
        user = "datadog"
        ssl_mode = "require"

        [pool]
        default_ttl_ms = 30000
        prune_interval_ms = 5000

        [collector]
        databases = ["orders", "billing"]
        persistent_databases = ["postgres"]
        interval_ms = 10000
        connection_ttl_ms = 45000

        [logging]
        filter = "debug"
        json = true
        log_dir = "/var/log/dbmon"
    "#};

    #[test]
    fn test_parse_full_config() {
        let config = CollectorConfig::from_toml(FULL_CONFIG).expect("parse");

        assert_eq!(config.server.host, "pg.internal");
        assert_eq!(config.server.port, 6432);
        assert_eq!(config.server.ssl_mode, SslMode::Require);
        assert_eq!(config.pool.default_ttl(), Duration::from_secs(30));
        assert_eq!(config.pool.prune_interval(), Some(Duration::from_secs(5)));
        assert_eq!(config.collector.interval(), Duration::from_secs(10));
        assert_eq!(config.collector.connection_ttl(), Duration::from_secs(45));
        assert_eq!(
            config.all_databases().collect::<Vec<_>>(),
            vec!["orders", "billing", "postgres"]
        );
        assert!(config.logging.json);
        assert_eq!(config.logging.log_dir, Some(PathBuf::from("/var/log/dbmon")));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = CollectorConfig::from_toml(indoc! {r#"
            [collector]
            databases = ["postgres"]
        "#})
        .expect("parse");

        assert_eq!(config.server, PostgresConfig::default());
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.collector.interval(), Duration::from_secs(15));
        assert_eq!(config.logging, LogSettings::default());
    }

    #[test]
    fn test_validation_errors() {
        let err = CollectorConfig::from_toml("").err().expect("no databases");
        assert!(err.to_string().contains("at least one database"));

        let err = CollectorConfig::from_toml(indoc! {r#"
            [collector]
            databases = ["orders", ""]
        "#})
        .err()
        .expect("empty name");
        assert!(err.to_string().contains("must not be empty"));

        let err = CollectorConfig::from_toml(indoc! {r#"
            [collector]
            databases = ["orders"]
            interval_ms = 0
        "#})
        .err()
        .expect("zero interval");
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(FULL_CONFIG.as_bytes()).expect("write");
        file.flush().expect("flush");

        let config = CollectorConfig::load(file.path()).expect("load");
        assert_eq!(config.collector.databases, vec!["orders", "billing"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CollectorConfig::load(Path::new("/nonexistent/dbmon.toml"))
            .err()
            .expect("missing file");
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
