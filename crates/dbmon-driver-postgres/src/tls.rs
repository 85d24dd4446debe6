//! PostgreSQL TLS support
//!
//! Builds the native-tls connector handed to tokio-postgres for every
//! connection the factory opens.

use std::fs;
use std::path::Path;

use dbmon_core::DbmonError;
use native_tls::{Certificate, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use tracing::debug;

use crate::config::{PostgresConfig, SslMode};

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),
}

impl From<TlsError> for DbmonError {
    fn from(err: TlsError) -> Self {
        DbmonError::Configuration(err.to_string())
    }
}

/// Build a TLS connector for the configured sslmode.
///
/// Returns `None` for `disable`, in which case the caller connects with
/// `NoTls`. `prefer` and `require` encrypt without verifying the server, as
/// libpq does; the verify modes check the chain against `ssl_ca_cert` (or the
/// system roots) and `verify-full` also checks the hostname.
pub fn build_tls_connector(config: &PostgresConfig) -> Result<Option<MakeTlsConnector>, TlsError> {
    if config.ssl_mode == SslMode::Disable {
        return Ok(None);
    }

    let mut builder = NativeTlsConnector::builder();
    configure_verification(&mut builder, config.ssl_mode);

    if let Some(ca_cert_path) = &config.ssl_ca_cert {
        apply_ca_cert(&mut builder, ca_cert_path)?;
    }

    let connector = builder
        .build()
        .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

    debug!(ssl_mode = %config.ssl_mode, "TLS connector built");
    Ok(Some(MakeTlsConnector::new(connector)))
}

fn configure_verification(builder: &mut TlsConnectorBuilder, mode: SslMode) {
    match mode {
        SslMode::Disable | SslMode::VerifyFull => {}
        SslMode::Prefer | SslMode::Require => {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
    }
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "Loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);

    Ok(())
}
